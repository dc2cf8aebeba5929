//! Session management core module.
//!
//! A session is one proxied run of the child executable, from spawn to the
//! final EXIT record.

use serde::{Deserialize, Serialize};

/// Submodule for session data structures and utilities.
pub mod session;
/// Signal relay from the proxy to the child while it runs.
pub mod signals;
/// Submodule for the process supervisor.
pub mod supervisor;

#[cfg(test)]
mod integration_tests;

pub use session::Session;
pub use supervisor::{SessionReport, Supervisor};

/// Lifecycle of a session. Transitions only move forward.
///
/// Variants:
/// - `Starting`: the sink is open and the child is being spawned.
/// - `Running`: the child runs and the three forwarders relay its streams.
/// - `Draining`: the child has exited; forwarders are finishing or being cancelled.
/// - `Terminated`: every forwarder is done and the exit code is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionStatus {
    Starting,
    Running,
    Draining,
    Terminated,
}
