#[cfg(all(test, unix))]
mod integration_tests {
    use crate::configuration::Config;
    use crate::data_capture::forwarder::ForwardOutcome;
    use crate::data_capture::types::{Direction, LogRecord, Payload};
    use crate::error_handling::types::SessionError;
    use crate::session_management::{SessionReport, SessionStatus, Supervisor};
    use serde_json::json;
    use std::ffi::OsString;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    const CAPTURE: usize = 1 << 16;

    fn shell(dir: &TempDir) -> Supervisor {
        Supervisor::new(Config::new("/bin/sh", dir.path().join("session.log")))
    }

    fn script(body: &str) -> Vec<OsString> {
        vec![OsString::from("-c"), OsString::from(body)]
    }

    fn capture() -> (DuplexStream, JoinHandle<Vec<u8>>) {
        slow_capture(CAPTURE, Duration::ZERO)
    }

    /// Capture whose reader only starts after `delay`, so writes beyond
    /// `capacity` block until then.
    fn slow_capture(capacity: usize, delay: Duration) -> (DuplexStream, JoinHandle<Vec<u8>>) {
        let (writer, mut reader) = duplex(capacity);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        });
        (writer, task)
    }

    struct Run {
        report: SessionReport,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    }

    async fn run<I>(supervisor: &Supervisor, body: &str, input: I) -> Run
    where
        I: AsyncRead + Send + Unpin + 'static,
    {
        let (out, out_task) = capture();
        let (err, err_task) = capture();
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            supervisor.run_with(script(body), input, out, err),
        )
        .await
        .expect("session hung")
        .expect("session failed");
        Run {
            report,
            stdout: out_task.await.unwrap(),
            stderr: err_task.await.unwrap(),
        }
    }

    fn read_log(path: &Path) -> Vec<LogRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn on(records: &[LogRecord], direction: Direction) -> Vec<&LogRecord> {
        records.iter().filter(|r| r.direction == direction).collect()
    }

    fn text(text: &str) -> Payload {
        Payload::Text { text: text.into() }
    }

    #[tokio::test]
    async fn json_line_on_stdout_and_exit_code_three() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);

        let run = run(&supervisor, r#"printf '{"a":1}\n'; exit 3"#, tokio::io::empty()).await;

        assert_eq!(run.report.exit_code, 3);
        assert_eq!(run.report.session.exit_code, Some(3));
        assert_eq!(run.report.session.status, SessionStatus::Terminated);
        assert_eq!(run.stdout, b"{\"a\":1}\n");
        assert!(run.stderr.is_empty());

        let records = read_log(&supervisor.config().log_file);
        assert_eq!(records.first().unwrap().direction, Direction::Startup);
        assert_eq!(
            records.first().unwrap().payload,
            text(r#"Args: ["-c", "printf '{\"a\":1}\\n'; exit 3"]"#)
        );
        let stdout = on(&records, Direction::Stdout);
        assert_eq!(stdout.len(), 1);
        assert_eq!(stdout[0].payload, Payload::Json { json: json!({"a": 1}) });
        assert!(on(&records, Direction::Stderr).is_empty());
        let last = records.last().unwrap();
        assert_eq!(last.direction, Direction::Exit);
        assert_eq!(last.payload, text("Return code: 3"));
        assert_eq!(run.report.sink.records_written, records.len() as u64);
    }

    #[tokio::test]
    async fn unterminated_stderr_is_flushed_as_one_record() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);

        let run = run(&supervisor, "printf hello >&2", tokio::io::empty()).await;

        assert_eq!(run.report.exit_code, 0);
        assert_eq!(run.stderr, b"hello");
        let records = read_log(&supervisor.config().log_file);
        let stderr = on(&records, Direction::Stderr);
        assert_eq!(stderr.len(), 1);
        assert_eq!(stderr[0].payload, text("hello"));
        assert_eq!(on(&records, Direction::Exit).len(), 1);
    }

    #[tokio::test]
    async fn stdin_reaches_child_unmodified_and_is_logged_per_line() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);
        let (mut feed, input) = duplex(1024);
        let feeder = tokio::spawn(async move {
            feed.write_all(b"li").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            feed.write_all(b"ne1\nline2").await.unwrap();
        });

        let run = run(&supervisor, "cat", input).await;
        feeder.await.unwrap();

        assert_eq!(run.report.exit_code, 0);
        assert_eq!(run.stdout, b"line1\nline2");
        let records = read_log(&supervisor.config().log_file);
        let stdin: Vec<&Payload> = on(&records, Direction::Stdin)
            .into_iter()
            .map(|r| &r.payload)
            .collect();
        assert_eq!(stdin, vec![&text("line1"), &text("line2")]);
        assert_eq!(on(&records, Direction::Stdout).len(), 2);
    }

    #[tokio::test]
    async fn all_three_streams_logged_independently() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);
        let input: &'static [u8] = b"{\"q\":1}\n{\"q\":2}\n";

        let body = "while read -r line; do echo \"$line\"; echo \"err:$line\" >&2; done";
        let run = run(&supervisor, body, input).await;

        assert_eq!(run.stdout, input);
        assert_eq!(run.stderr, b"err:{\"q\":1}\nerr:{\"q\":2}\n");
        let records = read_log(&supervisor.config().log_file);
        for direction in [Direction::Stdin, Direction::Stdout] {
            let values: Vec<&Payload> = on(&records, direction)
                .into_iter()
                .map(|r| &r.payload)
                .collect();
            assert_eq!(
                values,
                vec![
                    &Payload::Json { json: json!({"q": 1}) },
                    &Payload::Json { json: json!({"q": 2}) }
                ]
            );
        }
        assert_eq!(on(&records, Direction::Stderr).len(), 2);
        let stdin_times: Vec<_> = on(&records, Direction::Stdin)
            .into_iter()
            .map(|r| r.time)
            .collect();
        assert!(stdin_times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn signal_death_is_reported_like_a_shell() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);

        let run = run(&supervisor, "kill -9 $$", tokio::io::empty()).await;

        assert_eq!(run.report.exit_code, 137);
        let records = read_log(&supervisor.config().log_file);
        assert_eq!(records.last().unwrap().payload, text("Return code: 137"));
    }

    #[tokio::test]
    async fn child_ignoring_stdin_does_not_hang_the_session() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);
        // The writer half stays open: stdin never reaches EOF on its own.
        let (_feed, input) = duplex(64);

        let run = run(&supervisor, "echo bye", input).await;

        assert_eq!(run.report.exit_code, 0);
        assert_eq!(run.stdout, b"bye\n");
        let stdin = run
            .report
            .forwarders
            .iter()
            .find(|f| f.direction == Direction::Stdin)
            .unwrap();
        assert_eq!(stdin.outcome, ForwardOutcome::Cancelled);
    }

    #[tokio::test]
    async fn lingering_grandchild_is_cut_off_once_its_pipe_goes_idle() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new("/bin/sh", dir.path().join("session.log"));
        config.drain_timeout = Duration::from_millis(100);
        let supervisor = Supervisor::new(config);

        let started = Instant::now();
        // The background sleep inherits stdout and keeps the pipe open.
        let run = run(&supervisor, "sleep 3 & printf 'done\\npending'", tokio::io::empty()).await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(run.report.exit_code, 0);
        assert_eq!(run.stdout, b"done\npending");
        let records = read_log(&supervisor.config().log_file);
        let stdout: Vec<&Payload> = on(&records, Direction::Stdout)
            .into_iter()
            .map(|r| &r.payload)
            .collect();
        assert_eq!(stdout, vec![&text("done"), &text("pending")]);
        let forwarder = run
            .report
            .forwarders
            .iter()
            .find(|f| f.direction == Direction::Stdout)
            .unwrap();
        assert_eq!(forwarder.outcome, ForwardOutcome::Idle);
    }

    #[tokio::test]
    async fn slow_reader_still_receives_everything_the_child_wrote() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new("/bin/sh", dir.path().join("session.log"));
        config.drain_timeout = Duration::from_millis(100);
        let supervisor = Supervisor::new(config);
        let (out, out_task) = slow_capture(1024, Duration::from_millis(1500));
        let (err, err_task) = capture();

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            supervisor.run_with(
                script("head -c 30000 /dev/zero | tr '\\0' x"),
                tokio::io::empty(),
                out,
                err,
            ),
        )
        .await
        .expect("session hung")
        .expect("session failed");

        assert_eq!(report.exit_code, 0);
        assert_eq!(out_task.await.unwrap(), vec![b'x'; 30_000]);
        assert!(err_task.await.unwrap().is_empty());
        let stdout = report
            .forwarders
            .iter()
            .find(|f| f.direction == Direction::Stdout)
            .unwrap();
        assert_eq!(stdout.outcome, ForwardOutcome::EndOfStream);
        assert_eq!(stdout.bytes, 30_000);

        let records = read_log(&supervisor.config().log_file);
        let logged: usize = on(&records, Direction::Stdout)
            .iter()
            .map(|r| match &r.payload {
                Payload::Text { text } => text.len(),
                Payload::Json { .. } => 0,
            })
            .sum();
        assert_eq!(logged, 30_000);
    }

    #[tokio::test]
    async fn stdin_failure_leaves_the_rest_of_the_session_running() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);
        let (mut feed, input) = duplex(1024);
        let feeder = tokio::spawn(async move {
            for _ in 0..50 {
                if feed.write_all(b"ping\n").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let run = run(&supervisor, "exec 0<&-; sleep 0.2; echo out; exit 4", input).await;
        feeder.abort();

        assert_eq!(run.report.exit_code, 4);
        assert_eq!(run.stdout, b"out\n");
        let stdin = run
            .report
            .forwarders
            .iter()
            .find(|f| f.direction == Direction::Stdin)
            .unwrap();
        assert!(matches!(stdin.outcome, ForwardOutcome::Failed(_)));

        let records = read_log(&supervisor.config().log_file);
        let failures = on(&records, Direction::StdinError);
        assert_eq!(failures.len(), 1);
        match &failures[0].payload {
            Payload::Text { text } => assert!(text.starts_with("write failed")),
            other => panic!("expected text payload, got {:?}", other),
        }
        assert_eq!(
            on(&records, Direction::Stdout)
                .iter()
                .map(|r| &r.payload)
                .collect::<Vec<_>>(),
            vec![&text("out")]
        );
        assert_eq!(records.last().unwrap().payload, text("Return code: 4"));
    }

    #[tokio::test]
    async fn spawn_failure_is_fatal_after_startup_record() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("session.log");
        let supervisor = Supervisor::new(Config::new(dir.path().join("missing-binary"), &log));

        let result = supervisor
            .run_with(
                vec![OsString::from("--flag")],
                tokio::io::empty(),
                tokio::io::sink(),
                tokio::io::sink(),
            )
            .await;

        match result {
            Err(e @ SessionError::SpawnFailed(..)) => assert_eq!(e.exit_code(), 127),
            other => panic!("expected spawn failure, got {:?}", other),
        }
        let records = read_log(&log);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].direction, Direction::Startup);
        assert_eq!(records[0].payload, text(r#"Args: ["--flag"]"#));
    }

    #[tokio::test]
    async fn sessions_append_to_the_same_log() {
        let dir = TempDir::new().unwrap();
        let supervisor = shell(&dir);

        run(&supervisor, "echo one", tokio::io::empty()).await;
        run(&supervisor, "echo two; exit 1", tokio::io::empty()).await;

        let records = read_log(&supervisor.config().log_file);
        assert_eq!(on(&records, Direction::Startup).len(), 2);
        let exits: Vec<&Payload> = on(&records, Direction::Exit)
            .into_iter()
            .map(|r| &r.payload)
            .collect();
        assert_eq!(exits, vec![&text("Return code: 0"), &text("Return code: 1")]);
    }
}
