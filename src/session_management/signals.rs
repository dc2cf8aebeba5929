//! Signal handling for the lifetime of a session.
//!
//! SIGINT from a terminal already reaches the whole foreground process group,
//! so it is only absorbed here; the proxy must outlive the child to write the
//! EXIT record. SIGTERM and SIGHUP are sent to the proxy alone: while the
//! child runs they are relayed to it, and once it has exited they cut the
//! output drain short.
//!
//! Listeners stay installed until the session ends. Once registered, tokio
//! never restores the default disposition, so a [`ProxySignals`] must be kept
//! alive for as long as the proxy is expected to react to these signals.

use std::io;
use std::process::ExitStatus;

use log::debug;
use tokio::process::Child;

#[cfg(unix)]
pub struct ProxySignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ProxySignals {
    /// Registers the listeners. Failure is not fatal: the session then runs
    /// with default signal handling.
    pub fn install() -> Option<Self> {
        use log::warn;
        use tokio::signal::unix::{signal, SignalKind};

        let streams = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        );
        match streams {
            (Ok(interrupt), Ok(terminate), Ok(hangup)) => Some(Self {
                interrupt,
                terminate,
                hangup,
            }),
            (i, t, h) => {
                let e = [i.err(), t.err(), h.err()].into_iter().flatten().next();
                warn!("signal relay unavailable: {:?}", e);
                None
            }
        }
    }

    /// Next SIGTERM or SIGHUP, by name. SIGINT is swallowed.
    async fn next_stop(&mut self) -> &'static str {
        loop {
            tokio::select! {
                Some(()) = self.interrupt.recv() => debug!("SIGINT received, left to the child"),
                Some(()) = self.terminate.recv() => return "TERM",
                Some(()) = self.hangup.recv() => return "HUP",
                else => return std::future::pending().await,
            }
        }
    }
}

#[cfg(not(unix))]
pub struct ProxySignals;

#[cfg(not(unix))]
impl ProxySignals {
    pub fn install() -> Option<Self> {
        None
    }

    async fn next_stop(&mut self) -> &'static str {
        std::future::pending().await
    }
}

/// Resolves with the name of the next SIGTERM or SIGHUP. Never resolves
/// without listeners.
pub async fn next_stop(signals: &mut Option<ProxySignals>) -> &'static str {
    match signals {
        Some(signals) => signals.next_stop().await,
        None => std::future::pending().await,
    }
}

/// Waits for the child, relaying SIGTERM and SIGHUP to it meanwhile.
pub async fn wait_for_child(
    child: &mut Child,
    signals: &mut Option<ProxySignals>,
) -> io::Result<ExitStatus> {
    let pid = child.id();
    loop {
        tokio::select! {
            status = child.wait() => return status,
            name = next_stop(signals) => relay(pid, name).await,
        }
    }
}

#[cfg(unix)]
async fn relay(pid: Option<u32>, name: &str) {
    use log::warn;
    use std::process::Stdio;
    use tokio::process::Command;

    let Some(pid) = pid else {
        debug!("SIG{} received after child was reaped", name);
        return;
    };
    // Output is discarded so nothing reaches the proxied stderr.
    let result = Command::new("kill")
        .arg("-s")
        .arg(name)
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => debug!("relayed SIG{} to child {}", name, pid),
        Ok(status) => warn!("relaying SIG{} to {} failed: {}", name, pid, status),
        Err(e) => warn!("relaying SIG{} to {} failed: {}", name, pid, e),
    }
}

#[cfg(not(unix))]
async fn relay(_pid: Option<u32>, name: &str) {
    debug!("SIG{} relay is not supported on this platform", name);
}
