//! Per-direction relay of one byte stream with line-level recording.
//!
//! Each forwarder reads a bounded chunk from its source, writes it to its
//! destination and waits for the write to complete, and only then feeds the
//! chunk to its [`LineBuffer`]. Pass-through latency is therefore never
//! inflated by logging. Whatever ends the loop (end of stream, an I/O error
//! or cancellation), the trailing partial line is flushed to the sink.
//!
//! Two ways to stop a forwarder early:
//! - the `cancel` token given to [`StreamForwarder::run`] interrupts a pending
//!   read or write immediately;
//! - a drain token set with [`StreamForwarder::with_drain`] only limits how
//!   long a read may wait for data once it fires. Every chunk that does arrive
//!   is still written in full, however slow the destination.

use std::io;
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error_handling::types::CaptureError;

use super::line_buffer::LineBuffer;
use super::log_sink::LogSink;
use super::types::{Direction, LogRecord};

const PREVIEW_LEN: usize = 64;

/// Why a forwarder stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    EndOfStream,
    Cancelled,
    /// Draining, and the source stayed silent for the whole grace period.
    Idle,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardStats {
    pub direction: Direction,
    /// Bytes read from the source.
    pub bytes: u64,
    /// Data records handed to the sink, error records excluded.
    pub records: u64,
    pub outcome: ForwardOutcome,
}

pub struct StreamForwarder<R, W> {
    direction: Direction,
    source: R,
    destination: W,
    sink: LogSink,
    chunk_size: usize,
    drain: Option<(CancellationToken, Duration)>,
}

/// Result of waiting on the source.
enum Step {
    Cancelled,
    Idle,
    Read(io::Result<usize>),
}

impl<R, W> StreamForwarder<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(direction: Direction, source: R, destination: W, sink: LogSink) -> Self {
        Self {
            direction,
            source,
            destination,
            sink,
            chunk_size: 4096,
            drain: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Once `draining` fires, a read that gets no data within `grace` ends
    /// the forwarder with [`ForwardOutcome::Idle`]. The grace period restarts
    /// with every read.
    pub fn with_drain(mut self, draining: CancellationToken, grace: Duration) -> Self {
        self.drain = Some((draining, grace));
        self
    }

    /// Relays until end of stream, failure, or `cancel` fires. The destination
    /// is dropped on return, which closes it when it is a child pipe.
    pub async fn run(mut self, cancel: CancellationToken) -> ForwardStats {
        let direction = self.direction;
        trace!("[{}] forwarder started", direction);

        let mut lines = LineBuffer::new();
        let mut buf = vec![0u8; self.chunk_size];
        let mut bytes = 0u64;
        let mut records = 0u64;

        let outcome = loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                step = read_chunk(&mut self.source, &mut buf, self.drain.as_ref()) => step,
            };
            let n = match step {
                Step::Cancelled => break ForwardOutcome::Cancelled,
                Step::Idle => {
                    trace!("[{}] no data within the drain grace period", direction);
                    break ForwardOutcome::Idle;
                }
                Step::Read(Ok(0)) => {
                    trace!("[{}] EOF", direction);
                    break ForwardOutcome::EndOfStream;
                }
                Step::Read(Ok(n)) => n,
                Step::Read(Err(e)) => {
                    break report(direction, &self.sink, CaptureError::Read(e)).await
                }
            };
            let chunk = &buf[..n];

            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = write_chunk(&mut self.destination, chunk) => Some(res),
            };

            bytes += n as u64;
            trace!(
                "[{}] read {} bytes: {}{}",
                direction,
                n,
                String::from_utf8_lossy(&chunk[..n.min(PREVIEW_LEN)]),
                if n > PREVIEW_LEN { " ..." } else { "" }
            );

            // The chunk was read from the source either way, so it is part
            // of the observed conversation even if its write did not finish.
            for line in lines.push(chunk) {
                self.sink
                    .append(LogRecord::classify(direction, &line))
                    .await;
                records += 1;
            }

            match written {
                Some(Ok(())) => {}
                None => break ForwardOutcome::Cancelled,
                Some(Err(e)) => {
                    break report(direction, &self.sink, CaptureError::Write(e)).await
                }
            }
        };

        for line in lines.flush() {
            self.sink
                .append(LogRecord::classify(direction, &line))
                .await;
            records += 1;
        }

        // A cancelled write may be stalled on the destination; don't wait on it again.
        if outcome != ForwardOutcome::Cancelled {
            if let Err(e) = self.destination.flush().await {
                trace!("[{}] final flush failed: {}", direction, e);
            }
        }

        debug!(
            "[{}] forwarder finished: {:?}, {} bytes, {} records",
            direction, outcome, bytes, records
        );
        ForwardStats {
            direction,
            bytes,
            records,
            outcome,
        }
    }
}

/// Logs `error` under the direction's error tag.
async fn report(direction: Direction, sink: &LogSink, error: CaptureError) -> ForwardOutcome {
    let description = error.to_string();
    debug!("[{}] {}", direction, description);
    sink.append(LogRecord::text(direction.error_variant(), description.clone()))
        .await;
    ForwardOutcome::Failed(description)
}

/// Reads one chunk. While draining, gives up after the grace period.
async fn read_chunk<R: AsyncRead + Unpin>(
    source: &mut R,
    buf: &mut [u8],
    drain: Option<&(CancellationToken, Duration)>,
) -> Step {
    let Some((draining, grace)) = drain else {
        return Step::Read(source.read(buf).await);
    };
    let read = source.read(buf);
    tokio::pin!(read);
    if !draining.is_cancelled() {
        tokio::select! {
            res = &mut read => return Step::Read(res),
            _ = draining.cancelled() => {}
        }
    }
    match tokio::time::timeout(*grace, read).await {
        Ok(res) => Step::Read(res),
        Err(_) => Step::Idle,
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(destination: &mut W, chunk: &[u8]) -> io::Result<()> {
    destination.write_all(chunk).await?;
    destination.flush().await
}
