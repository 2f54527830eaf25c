use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{CoreError, CoreResult};

/// Lines buffered per stream before the reader waits for the consumer.
const LINE_BUFFER: usize = 256;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// Represents a line of output from a command, specifying its source (stdout or stderr).
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StreamOutput {
    pub line: String,
    pub source: StreamSource,
}

/// Exit status plus everything the process printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }
}

/// Launches one external program and streams its output line by line.
#[derive(Debug, Clone)]
pub struct ProcessGateway {
    program: PathBuf,
    launcher_args: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessGateway {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            launcher_args: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments placed before every argument vector passed to `spawn`.
    pub fn with_launcher_args(mut self, args: Vec<String>) -> Self {
        self.launcher_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Creates a `tokio::process::Command` with piped output and no visible window.
    fn build_command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.launcher_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Prevents a console window from appearing on Windows.
        #[cfg(windows)]
        cmd.creation_flags(0x0800_0000); // CREATE_NO_WINDOW

        cmd
    }

    /// Starts the program. Output must be consumed through the returned handle.
    pub fn spawn(
        &self,
        args: &[String],
        progress: Option<mpsc::Sender<StreamOutput>>,
    ) -> CoreResult<RunningProcess> {
        let label = self.program.display().to_string();
        log::info!("Executing command: {} {}", label, args.join(" "));

        let mut child = self
            .build_command(args)
            .spawn()
            .map_err(|source| CoreError::Launch {
                program: label.clone(),
                source,
            })?;

        let missing_pipe = |name: &str| CoreError::Launch {
            program: label.clone(),
            source: std::io::Error::other(format!("child process has no {} handle", name)),
        };
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let (stdout_tx, stdout_rx) = mpsc::channel(LINE_BUFFER);
        let (stderr_tx, stderr_rx) = mpsc::channel(LINE_BUFFER);
        spawn_line_reader(stdout, stdout_tx);
        spawn_line_reader(stderr, stderr_tx);

        Ok(RunningProcess {
            label,
            child,
            timeout: self.timeout,
            stdout: stdout_rx,
            stderr: stderr_rx,
            stdout_open: true,
            stderr_open: true,
            progress,
            outcome: ProcessOutcome::default(),
        })
    }

    /// Spawns the program and waits for it, forwarding each line to `progress`.
    pub async fn run(
        &self,
        args: &[String],
        progress: Option<mpsc::Sender<StreamOutput>>,
    ) -> CoreResult<ProcessOutcome> {
        self.spawn(args, progress)?.wait().await
    }
}

/// Handle to a spawned program. Lines arrive as the program writes them; the
/// stream is single-pass.
pub struct RunningProcess {
    label: String,
    child: Child,
    timeout: Option<Duration>,
    stdout: mpsc::Receiver<String>,
    stderr: mpsc::Receiver<String>,
    stdout_open: bool,
    stderr_open: bool,
    progress: Option<mpsc::Sender<StreamOutput>>,
    outcome: ProcessOutcome,
}

impl RunningProcess {
    /// Next line from either stream, `None` once both are closed.
    ///
    /// Order is preserved within stdout and within stderr, not across them.
    pub async fn next_line(&mut self) -> Option<StreamOutput> {
        loop {
            let output = tokio::select! {
                line = self.stdout.recv(), if self.stdout_open => match line {
                    Some(line) => StreamOutput { line, source: StreamSource::Stdout },
                    None => {
                        self.stdout_open = false;
                        continue;
                    }
                },
                line = self.stderr.recv(), if self.stderr_open => match line {
                    Some(line) => StreamOutput { line, source: StreamSource::Stderr },
                    None => {
                        self.stderr_open = false;
                        continue;
                    }
                },
                else => return None,
            };

            match output.source {
                StreamSource::Stdout => self.outcome.stdout.push(output.line.clone()),
                StreamSource::Stderr => self.outcome.stderr.push(output.line.clone()),
            }
            if let Some(progress) = &self.progress {
                // A caller that stopped listening must not stall the process.
                if progress.send(output.clone()).await.is_err() {
                    self.progress = None;
                }
            }
            return Some(output);
        }
    }

    async fn drain_and_wait(&mut self) -> std::io::Result<ExitStatus> {
        while self.next_line().await.is_some() {}
        self.child.wait().await
    }

    /// Drains the remaining output and waits for the program to exit.
    ///
    /// When a timeout is configured and expires, the program is killed and
    /// `CoreError::Timeout` is returned.
    pub async fn wait(mut self) -> CoreResult<ProcessOutcome> {
        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.drain_and_wait()).await {
                Ok(status) => status,
                Err(_) => {
                    log::warn!("{} timed out after {:?}, killing it", self.label, limit);
                    if let Err(e) = self.child.kill().await {
                        log::error!("Failed to kill child process: {}", e);
                    }
                    return Err(CoreError::Timeout {
                        program: self.label,
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => self.drain_and_wait().await,
        };

        let status = status.map_err(|source| CoreError::Launch {
            program: self.label.clone(),
            source,
        })?;
        log::info!("{} finished with status: {}", self.label, status);

        self.outcome.exit_code = status.code();
        Ok(self.outcome)
    }
}

/// Spawns a task that reads lines from a stream (stdout or stderr) into `tx`.
fn spawn_line_reader(stream: impl AsyncRead + Unpin + Send + 'static, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(stream);

    tokio::spawn(async move {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(decode_line(&buf)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Failed to read process output: {}", e);
                    break;
                }
            }
        }
    });
}

/// Decodes one raw output line.
///
/// Invalid UTF-8 becomes an empty line. Console spinners redraw themselves
/// with bare carriage returns, so only the text after the last `\r` is kept.
pub fn decode_line(raw: &[u8]) -> String {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(_) => return String::new(),
    };
    let text = text.trim_end_matches(['\n', '\r']);
    text.rsplit('\r').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_line_endings() {
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello"), "hello");
    }

    #[test]
    fn decode_keeps_text_after_spinner_redraws() {
        assert_eq!(decode_line(b"  - \r  \\ \rName   Id\r\n"), "Name   Id");
    }

    #[test]
    fn decode_turns_invalid_utf8_into_empty_line() {
        assert_eq!(decode_line(&[0xff, 0xfe, b'a', b'\n']), "");
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_failure() {
        let gateway = ProcessGateway::new("definitely-not-a-real-program-7f3a");
        let err = gateway.run(&[], None).await.unwrap_err();
        assert!(matches!(err, CoreError::Launch { .. }));
        assert!(err.is_launch_failure());
    }

    #[cfg(unix)]
    fn shell(script: &str) -> (ProcessGateway, Vec<String>) {
        (
            ProcessGateway::new("sh"),
            vec!["-c".to_string(), script.to_string()],
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let (gateway, args) = shell("echo one; echo two; echo oops 1>&2; exit 3");
        let outcome = gateway.run(&args, None).await.unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
        assert_eq!(outcome.stdout, vec!["one", "two"]);
        assert_eq!(outcome.stderr, vec!["oops"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launcher_args_come_before_operation_args() {
        let gateway = ProcessGateway::new("sh").with_launcher_args(vec![
            "-c".to_string(),
            "echo \"$1-$2\"".to_string(),
            "winget".to_string(),
        ]);
        let outcome = gateway
            .run(&["list".to_string(), "--id".to_string()], None)
            .await
            .unwrap();
        assert_eq!(outcome.stdout, vec!["list---id"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn lines_stream_before_exit_and_reach_progress() {
        let (tx, mut rx) = mpsc::channel(16);
        let (gateway, args) = shell("echo first; sleep 0.2; echo second");
        let mut running = gateway.spawn(&args, Some(tx)).unwrap();

        let first = running.next_line().await.unwrap();
        assert_eq!(first.line, "first");
        assert_eq!(first.source, StreamSource::Stdout);
        assert_eq!(rx.recv().await.unwrap().line, "first");

        let outcome = running.wait().await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout, vec!["first", "second"]);
        assert_eq!(rx.recv().await.unwrap().line, "second");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropped_progress_receiver_does_not_stall() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (gateway, args) = shell("for i in 1 2 3 4 5; do echo $i; done");
        let outcome = gateway.run(&args, Some(tx)).await.unwrap();
        assert_eq!(outcome.stdout.len(), 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_line_is_empty_not_fatal() {
        let (gateway, args) = shell("printf 'ok\\n\\377\\376\\nafter\\n'");
        let outcome = gateway.run(&args, None).await.unwrap();
        assert_eq!(outcome.stdout, vec!["ok", "", "after"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_process() {
        let (gateway, args) = shell("sleep 5");
        let gateway = gateway.with_timeout(Some(Duration::from_millis(100)));
        let err = gateway.run(&args, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout { .. }));
        assert!(err.is_launch_failure());
    }
}
