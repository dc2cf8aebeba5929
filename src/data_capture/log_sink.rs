//! Serialized, best-effort writer of session records.
//!
//! Producers hold cheap [`LogSink`] clones and hand records over a bounded
//! channel; a single writer task owns the destination, so records are never
//! interleaved mid-line. Write failures are counted and reported through the
//! diagnostic log but never surface to producers.

use std::path::Path;

use log::{debug, trace, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use super::types::LogRecord;

/// Boxed destination used for real sessions.
pub type LogDestination = Box<dyn AsyncWrite + Send + Unpin>;

/// Totals reported by the writer task once every producer is gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub records_written: u64,
    pub write_failures: u64,
}

/// Producer side of the sink.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::Sender<LogRecord>,
}

impl LogSink {
    /// Starts the writer task for `destination` and returns a producer handle
    /// plus the handle used to await the writer at teardown.
    pub fn spawn<W>(destination: W, capacity: usize) -> (LogSink, SinkHandle<W>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = SinkWriter {
            destination,
            rx,
            stats: SinkStats::default(),
        };
        let task = tokio::spawn(writer.run());
        (LogSink { tx }, SinkHandle { task })
    }

    /// Queues one record. Waits only while the queue is full; a closed sink
    /// drops the record.
    pub async fn append(&self, record: LogRecord) {
        if let Err(mpsc::error::SendError(record)) = self.tx.send(record).await {
            trace!("sink closed, dropping {} record", record.direction);
        }
    }
}

/// Handle on the writer task.
#[derive(Debug)]
pub struct SinkHandle<W> {
    task: JoinHandle<(W, SinkStats)>,
}

impl<W> SinkHandle<W> {
    /// Waits for the writer to drain the queue. Every [`LogSink`] clone must
    /// have been dropped, otherwise this waits for them.
    pub async fn finish(self) -> Result<(W, SinkStats), JoinError> {
        self.task.await
    }

    pub async fn close(self) -> SinkStats {
        match self.finish().await {
            Ok((_, stats)) => stats,
            Err(e) => {
                warn!("log sink writer ended abnormally: {}", e);
                SinkStats::default()
            }
        }
    }
}

struct SinkWriter<W> {
    destination: W,
    rx: mpsc::Receiver<LogRecord>,
    stats: SinkStats,
}

impl<W: AsyncWrite + Unpin> SinkWriter<W> {
    async fn run(mut self) -> (W, SinkStats) {
        while let Some(record) = self.rx.recv().await {
            self.write(&record).await;
        }
        if let Err(e) = self.destination.flush().await {
            warn!("final flush of session log failed: {}", e);
        }
        debug!(
            "log sink closed: {} record(s) written, {} failure(s)",
            self.stats.records_written, self.stats.write_failures
        );
        (self.destination, self.stats)
    }

    async fn write(&mut self, record: &LogRecord) {
        let mut line = match record.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("unable to serialize {} record: {}", record.direction, e);
                self.stats.write_failures += 1;
                return;
            }
        };
        line.push('\n');

        let result = match self.destination.write_all(line.as_bytes()).await {
            Ok(()) => self.destination.flush().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => self.stats.records_written += 1,
            Err(e) => {
                // One warning is enough; a dead destination fails every record.
                if self.stats.write_failures == 0 {
                    warn!("session log write failed, records are being lost: {}", e);
                }
                self.stats.write_failures += 1;
            }
        }
    }
}

/// Opens `path` for appending, creating it and its parent directory as needed.
///
/// Logging is best-effort: when the file cannot be opened the session still
/// runs, with records discarded.
pub async fn open_append(path: &Path) -> LogDestination {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("Failed to create log directory {}: {}", parent.display(), e);
        }
    }
    match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
    {
        Ok(file) => {
            debug!("Appending session records to {}", path.display());
            Box::new(file)
        }
        Err(e) => {
            warn!(
                "Unable to open session log {}: {}; records will be discarded",
                path.display(),
                e
            );
            Box::new(tokio::io::sink())
        }
    }
}
