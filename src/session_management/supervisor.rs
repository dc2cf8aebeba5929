//! Process supervisor: owns the child's lifetime and the session's sink.
//!
//! ```text
//!            stdin ──▶ [Stdin forwarder]  ──▶ child stdin
//!   child stdout  ──▶ [Stdout forwarder] ──▶ stdout
//!   child stderr  ──▶ [Stderr forwarder] ──▶ stderr
//!                           │
//!                           ▼
//!                  LogSink ──▶ writer task ──▶ log file
//! ```
//!
//! Lifecycle: `Starting` (open sink, STARTUP record, spawn) → `Running`
//! (forwarders relay, supervisor waits) → `Draining` (child gone, output
//! forwarders relay what is left in the pipes) → `Terminated` (EXIT record,
//! sink closed).
//!
//! While draining, an output forwarder stops at end of stream, or when its
//! pipe has been silent for `drain_timeout` (a grandchild holding it open).
//! A SIGTERM or SIGHUP to the proxy at that point cancels the outputs outright.

use std::ffi::OsString;
use std::future::Future;
use std::process::Stdio;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::configuration::Config;
use crate::data_capture::forwarder::{ForwardStats, StreamForwarder};
use crate::data_capture::log_sink::{open_append, LogSink, SinkStats};
use crate::data_capture::types::{Direction, LogRecord};
use crate::error_handling::types::SessionError;

use super::session::{exit_code_of, Session};
use super::signals::{next_stop, wait_for_child, ProxySignals};
use super::SessionStatus;

/// Outcome of a completed session.
#[derive(Debug)]
pub struct SessionReport {
    pub session: Session,
    /// The child's exit code; the proxy exits with it.
    pub exit_code: i32,
    pub forwarders: Vec<ForwardStats>,
    pub sink: SinkStats,
}

pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one session on the process's own standard streams.
    pub async fn run<A>(&self, args: A) -> Result<SessionReport, SessionError>
    where
        A: IntoIterator<Item = OsString>,
    {
        self.run_with(
            args,
            tokio::io::stdin(),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
        .await
    }

    /// Runs one session relaying between the child and the given streams.
    ///
    /// Only a spawn failure is an error: stream failures are recorded in the
    /// session log and the session still ends with an EXIT record.
    pub async fn run_with<A, I, O, E>(
        &self,
        args: A,
        input: I,
        output: O,
        error: E,
    ) -> Result<SessionReport, SessionError>
    where
        A: IntoIterator<Item = OsString>,
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        let config = &self.config;
        let mut session = Session::new(config.target.clone(), args);
        info!(
            "[{}] Starting session for {}",
            session.id,
            session.target.display()
        );

        let (sink, sink_handle) =
            LogSink::spawn(open_append(&config.log_file).await, config.sink_capacity);
        sink.append(LogRecord::text(Direction::Startup, session.startup_text()))
            .await;

        let spawned = Command::new(&session.target)
            .args(&session.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!(
                    "[{}] Failed to spawn {}: {}",
                    session.id,
                    session.target.display(),
                    e
                );
                drop(sink);
                sink_handle.close().await;
                return Err(SessionError::SpawnFailed(session.target, e));
            }
        };
        let child_stdin = child.stdin.take().ok_or(SessionError::MissingPipe("stdin"))?;
        let child_stdout = child
            .stdout
            .take()
            .ok_or(SessionError::MissingPipe("stdout"))?;
        let child_stderr = child
            .stderr
            .take()
            .ok_or(SessionError::MissingPipe("stderr"))?;
        info!(
            "[{}] Child running with pid {:?}",
            session.id,
            child.id()
        );
        session.advance(SessionStatus::Running);
        let mut signals = ProxySignals::install();

        let input_cancel = CancellationToken::new();
        let output_cancel = CancellationToken::new();
        let draining = CancellationToken::new();

        let input_task = tokio::spawn(
            StreamForwarder::new(Direction::Stdin, input, child_stdin, sink.clone())
                .with_chunk_size(config.chunk_size)
                .run(input_cancel.clone()),
        );
        let mut outputs = JoinSet::new();
        outputs.spawn(
            StreamForwarder::new(Direction::Stdout, child_stdout, output, sink.clone())
                .with_chunk_size(config.chunk_size)
                .with_drain(draining.clone(), config.drain_timeout)
                .run(output_cancel.clone()),
        );
        outputs.spawn(
            StreamForwarder::new(Direction::Stderr, child_stderr, error, sink.clone())
                .with_chunk_size(config.chunk_size)
                .with_drain(draining.clone(), config.drain_timeout)
                .run(output_cancel.clone()),
        );

        let waited = wait_for_child(&mut child, &mut signals).await;
        session.advance(SessionStatus::Draining);

        // Nobody is left to read the child's stdin.
        input_cancel.cancel();
        draining.cancel();

        let mut forwarders =
            drain_outputs(&mut outputs, &output_cancel, next_stop(&mut signals)).await;
        match input_task.await {
            Ok(stats) => forwarders.push(stats),
            Err(e) => warn!("[{}] stdin forwarder task failed: {}", session.id, e),
        }

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                error!("[{}] Failed to wait for child: {}", session.id, e);
                drop(sink);
                sink_handle.close().await;
                return Err(SessionError::WaitFailed(e));
            }
        };
        let exit_code = exit_code_of(status);
        session.terminate(exit_code);
        sink.append(LogRecord::text(
            Direction::Exit,
            format!("Return code: {}", exit_code),
        ))
        .await;
        drop(sink);
        let sink_stats = sink_handle.close().await;

        info!(
            "[{}] Session finished: exit_code={}, records={}, log_failures={}, duration={:?}",
            session.id,
            exit_code,
            sink_stats.records_written,
            sink_stats.write_failures,
            session.duration()
        );

        Ok(SessionReport {
            session,
            exit_code,
            forwarders,
            sink: sink_stats,
        })
    }
}

/// Waits for the output forwarders to finish draining. When `stop` resolves
/// first, the remaining ones are cancelled.
async fn drain_outputs<S>(
    outputs: &mut JoinSet<ForwardStats>,
    cancel: &CancellationToken,
    stop: S,
) -> Vec<ForwardStats>
where
    S: Future<Output = &'static str>,
{
    let mut forwarders = Vec::with_capacity(3);
    let interrupted = tokio::select! {
        _ = join_all(outputs, &mut forwarders) => None,
        name = stop => Some(name),
    };
    if let Some(name) = interrupted {
        debug!("SIG{} while draining, cancelling output forwarders", name);
        cancel.cancel();
        join_all(outputs, &mut forwarders).await;
    }
    forwarders
}

/// Joins finished forwarders into `into`. Safe to abandon midway: results
/// already joined are kept.
async fn join_all(set: &mut JoinSet<ForwardStats>, into: &mut Vec<ForwardStats>) {
    while let Some(res) = set.join_next().await {
        match res {
            Ok(stats) => into.push(stats),
            Err(e) => warn!("forwarder task failed: {}", e),
        }
    }
}
