use crate::session_management::SessionStatus;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitStatus;
use uuid::Uuid;

/// One proxied invocation of the child executable.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub target: PathBuf,
    /// Arguments handed to the child, exactly as the proxy received them.
    pub args: Vec<OsString>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Set once, when the child terminates.
    pub exit_code: Option<i32>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new<A>(target: PathBuf, args: A) -> Self
    where
        A: IntoIterator<Item = OsString>,
    {
        Self {
            id: Uuid::new_v4(),
            target,
            args: args.into_iter().collect(),
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
            status: SessionStatus::Starting,
        }
    }

    pub fn advance(&mut self, next: SessionStatus) {
        if next <= self.status {
            warn!(
                "[{}] ignoring backwards transition {:?} -> {:?}",
                self.id, self.status, next
            );
            return;
        }
        debug!("[{}] {:?} -> {:?}", self.id, self.status, next);
        self.status = next;
    }

    /// Records the child's exit code and closes the session.
    pub fn terminate(&mut self, exit_code: i32) {
        if self.exit_code.is_none() {
            self.exit_code = Some(exit_code);
            self.end_time = Some(Utc::now());
        }
        self.advance(SessionStatus::Terminated);
    }

    /// Text of the STARTUP record.
    pub fn startup_text(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        format!("Args: {:?}", args)
    }

    pub fn duration(&self) -> Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }
}

/// Exit code the proxy must reproduce for `status`. A child killed by a
/// signal maps to `128 + signal`, as a shell would report it.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(args: &[&str]) -> Session {
        Session::new(
            PathBuf::from("/usr/bin/tool"),
            args.iter().map(OsString::from),
        )
    }

    #[test]
    fn startup_text_lists_arguments() {
        assert_eq!(
            session(&["-p", "say \"hi\""]).startup_text(),
            r#"Args: ["-p", "say \"hi\""]"#
        );
        assert_eq!(session(&[]).startup_text(), "Args: []");
    }

    #[test]
    fn transitions_only_move_forward() {
        let mut s = session(&[]);
        assert_eq!(s.status, SessionStatus::Starting);
        s.advance(SessionStatus::Running);
        s.advance(SessionStatus::Starting);
        assert_eq!(s.status, SessionStatus::Running);
        s.advance(SessionStatus::Draining);
        assert_eq!(s.status, SessionStatus::Draining);
    }

    #[test]
    fn exit_code_is_set_once() {
        let mut s = session(&[]);
        s.advance(SessionStatus::Running);
        s.terminate(3);
        s.terminate(0);
        assert_eq!(s.exit_code, Some(3));
        assert_eq!(s.status, SessionStatus::Terminated);
        assert!(s.end_time.is_some());
        assert!(s.duration() >= Duration::zero());
    }

    #[cfg(unix)]
    #[test]
    fn signal_deaths_map_like_a_shell() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code_of(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code_of(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code_of(ExitStatus::from_raw(15)), 143);
    }
}
