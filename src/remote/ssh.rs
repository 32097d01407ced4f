use super::{
    session::{CommandResult, Connector, Credential, RemoteSession, SshTarget},
    stream::{StreamOutcome, StreamSender, StreamingCommand},
};
use crate::error::{CommandError, ConnectError};
use async_trait::async_trait;
use std::{
    ffi::OsString,
    io,
    path::PathBuf,
    process::Stdio,
    time::Duration,
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::{Child, ChildStderr, ChildStdout, Command},
};
use tracing::{debug, info, warn};

const SSH: &str = "ssh";
const SSHPASS: &str = "sshpass";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens SSH sessions by starting an OpenSSH control master and multiplexing
/// every later command over its socket.
pub struct SshConnector {
    timeout: Duration,
}

impl SshConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>, ConnectError> {
        let control_dir = tempfile::Builder::new()
            .prefix("tidal-remote-")
            .tempdir()?;

        let mut session = SshSession {
            target: target.clone(),
            control_path: control_dir.path().join("ctl"),
            _control_dir: control_dir,
            timeout: self.timeout,
            closed: false,
        };

        info!("Connecting to {}", target.destination());
        if let Err(e) = session.open_master().await {
            // Nothing to tear down
            session.closed = true;
            return Err(e);
        }
        info!("Connected to {}", target.destination());

        Ok(Box::new(session))
    }
}

pub struct SshSession {
    target: SshTarget,
    control_path: PathBuf,
    // Removed (with the socket) when the session is dropped
    _control_dir: TempDir,
    timeout: Duration,
    closed: bool,
}

impl SshSession {
    /// Options shared by the master and every multiplexed command.
    fn common_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-S".into(),
            self.control_path.clone().into(),
            "-p".into(),
            self.target.port.to_string().into(),
            "-o".into(),
            "LogLevel=ERROR".into(),
        ];
        if let Some(user) = &self.target.user {
            args.push("-l".into());
            args.push(user.into());
        }
        args
    }

    fn master_command(&self) -> (Command, &'static str) {
        let (mut command, program) = match &self.target.credential {
            Credential::Password(password) => {
                let mut command = Command::new(SSHPASS);
                command.arg("-e").arg(SSH).env("SSHPASS", password);
                (command, SSHPASS)
            }
            _ => (Command::new(SSH), SSH),
        };

        command
            .args(self.common_args())
            .args(["-o", "ControlMaster=yes"])
            .args(["-o", "ControlPersist=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"]);

        if let Credential::KeyFile(path) = &self.target.credential {
            command.arg("-i").arg(path);
        }

        // The master detaches once `true` has run
        command
            .arg("--")
            .arg(&self.target.host)
            .arg("true")
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        (command, program)
    }

    async fn open_master(&self) -> Result<(), ConnectError> {
        let destination = self.target.destination();
        let (mut command, program) = self.master_command();

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ConnectError::Timeout {
                destination: destination.clone(),
            })?
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ConnectError::MissingProgram { program }
                } else {
                    ConnectError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ConnectError::Rejected {
                destination,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    fn remote_command(&self, command: &str) -> Command {
        let mut ssh = Command::new(SSH);
        ssh.args(self.common_args())
            .args(["-o", "ControlMaster=no"])
            .arg("-T")
            .arg("--")
            .arg(&self.target.host)
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        ssh
    }

    fn exit_command(&self) -> std::process::Command {
        let mut ssh = std::process::Command::new(SSH);
        ssh.args(self.common_args())
            .args(["-O", "exit", "--"])
            .arg(&self.target.host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        ssh
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, command: &str) -> Result<CommandResult, CommandError> {
        debug!("Running remote command: {}", command);

        let result = capture(self.remote_command(command), command, self.timeout).await?;
        debug!("Remote command exited with {}", result.exit_code);

        Ok(result)
    }

    async fn run_streaming(&self, command: &str) -> Result<StreamingCommand, CommandError> {
        debug!("Streaming remote command: {}", command);

        spawn_streaming(self.remote_command(command), command, self.timeout)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut exit = Command::from(self.exit_command());
        exit.kill_on_drop(true);

        match tokio::time::timeout(CLOSE_TIMEOUT, exit.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                info!("Closed session to {}", self.target.destination());
            }
            Ok(Ok(output)) => warn!(
                "Closing session to {} failed: {}",
                self.target.destination(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Ok(Err(e)) => warn!("Failed to run ssh -O exit: {}", e),
            Err(_) => warn!("Timed out closing session to {}", self.target.destination()),
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !self.closed {
            // Fire and forget: drop may run on a runtime thread, so never wait
            // for the master to answer
            let _ = self.exit_command().stderr(Stdio::null()).spawn();
        }
    }
}

/// Run a command to completion, capturing its output. The child is killed if
/// it outlives `timeout`.
async fn capture(
    mut command: Command,
    label: &str,
    timeout: Duration,
) -> Result<CommandResult, CommandError> {
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| {
            warn!("Remote command timed out: {}", label);
            CommandError::Timeout {
                command: label.to_string(),
            }
        })?
        .map_err(|source| CommandError::Io {
            command: label.to_string(),
            source,
        })?;

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Spawn a command and pump its stdout lines into a [`StreamingCommand`].
///
/// `idle` bounds the wait for each line, not the whole stream: a download
/// may run for as long as it keeps printing.
fn spawn_streaming(
    mut command: Command,
    label: &str,
    idle: Duration,
) -> Result<StreamingCommand, CommandError> {
    let io_error = |source: io::Error| CommandError::Io {
        command: label.to_string(),
        source,
    };

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(io_error)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_error(io::Error::other("stdout was not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io_error(io::Error::other("stderr was not captured")))?;

    let (sender, stream) = StreamingCommand::channel(label);
    let label = label.to_string();

    tokio::spawn(async move {
        let outcome = pump(child, stdout, stderr, &sender, &label, idle).await;
        if let Err(CommandError::Timeout { command }) = &outcome {
            warn!("Remote command stalled for {:?}: {}", idle, command);
        }
        sender.complete(outcome);
    });

    Ok(stream)
}

/// Forward stdout lines to `sender` while collecting stderr, then reap the
/// child. Every early return drops the child, which kills it.
async fn pump(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    sender: &StreamSender,
    command: &str,
    idle: Duration,
) -> Result<StreamOutcome, CommandError> {
    let io_error = |source: io::Error| CommandError::Io {
        command: command.to_string(),
        source,
    };
    let timed_out = || CommandError::Timeout {
        command: command.to_string(),
    };

    // Stderr may stay quiet for the whole download, so it is read without a
    // deadline on its own task
    let read_stderr = tokio::spawn(async move {
        let mut buf = Vec::new();
        BufReader::new(stderr).read_to_end(&mut buf).await?;
        Ok::<_, io::Error>(String::from_utf8_lossy(&buf).into_owned())
    });
    let abort_stderr = read_stderr.abort_handle();

    let read_stdout = async {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match tokio::time::timeout(idle, reader.read_until(b'\n', &mut buf)).await {
                Err(_) => return Err(timed_out()),
                Ok(Err(source)) => return Err(io_error(source)),
                Ok(Ok(0)) => return Ok(()),
                Ok(Ok(_)) => {}
            }
            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            if !sender.line(line).await {
                return Err(io_error(io::Error::other("stream consumer went away")));
            }
        }
    };

    if let Err(e) = read_stdout.await {
        abort_stderr.abort();
        return Err(e);
    }

    // Stdout is closed; what remains is bounded by one more idle period
    let stderr = match tokio::time::timeout(idle, read_stderr).await {
        Ok(Ok(Ok(stderr))) => stderr,
        Ok(Ok(Err(source))) => return Err(io_error(source)),
        Ok(Err(join)) => return Err(io_error(io::Error::other(join))),
        Err(_) => {
            abort_stderr.abort();
            return Err(timed_out());
        }
    };

    let status = tokio::time::timeout(idle, child.wait())
        .await
        .map_err(|_| timed_out())?
        .map_err(io_error)?;

    Ok(StreamOutcome {
        exit_code: status.code().unwrap_or(-1),
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(credential: Credential) -> SshSession {
        let control_dir = tempfile::tempdir().unwrap();
        SshSession {
            target: SshTarget {
                host: "nas.local".to_string(),
                user: Some("music".to_string()),
                port: 2222,
                credential,
            },
            control_path: control_dir.path().join("ctl"),
            _control_dir: control_dir,
            timeout: Duration::from_secs(5),
            // Never spawn ssh -O exit from tests
            closed: true,
        }
    }

    fn args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_master_command_with_key() {
        let session = session(Credential::KeyFile(PathBuf::from("/keys/id_ed25519")));
        let (command, program) = session.master_command();

        assert_eq!(program, SSH);
        assert_eq!(command.as_std().get_program(), SSH);

        let args = args(&command);
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_ed25519"]));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.windows(2).any(|w| w == ["-l", "music"]));
        assert!(args.contains(&"ControlMaster=yes".to_string()));
        assert_eq!(&args[args.len() - 3..], ["--", "nas.local", "true"]);
    }

    #[test]
    fn test_password_is_not_on_argv() {
        let session = session(Credential::Password("hunter2".to_string()));
        let (command, program) = session.master_command();

        assert_eq!(program, SSHPASS);
        let args = args(&command);
        assert_eq!(&args[..2], ["-e", "ssh"]);
        assert!(!args.iter().any(|a| a.contains("hunter2")));

        let env: Vec<_> = command.as_std().get_envs().collect();
        assert!(env
            .iter()
            .any(|(k, v)| *k == "SSHPASS" && v.map(|v| v == "hunter2").unwrap_or(false)));
    }

    #[test]
    fn test_remote_command_passes_command_as_single_argument() {
        let session = session(Credential::Ambient);
        let command = session.remote_command("tidal-dl-ng dl 'https://tidal.com/track/1'");

        let args = args(&command);
        assert!(args.contains(&"ControlMaster=no".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("tidal-dl-ng dl 'https://tidal.com/track/1'")
        );
        assert_eq!(args[args.len() - 2], "nas.local");
    }

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script).stdin(Stdio::null());
        command
    }

    async fn drain(
        mut stream: StreamingCommand,
    ) -> (Vec<String>, Result<StreamOutcome, CommandError>) {
        let mut lines = Vec::new();
        while let Some(line) = stream.next_line().await {
            lines.push(line);
        }
        (lines, stream.finish().await)
    }

    #[tokio::test]
    async fn test_pump_splits_lines_and_keeps_stderr_apart() {
        let mut child = sh("printf 'a\\r\\nb\\n'; echo err >&2; exit 3")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        let (sender, stream) = StreamingCommand::channel("sh");
        let outcome = pump(child, stdout, stderr, &sender, "sh", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.stderr, "err\n");

        sender.complete(Ok(outcome));
        let (lines, outcome) = drain(stream).await;
        assert_eq!(lines, ["a", "b"]);
        assert_eq!(outcome.unwrap().exit_code, 3);
    }

    #[tokio::test]
    async fn test_streaming_survives_past_idle_timeout_while_printing() {
        let stream = spawn_streaming(
            sh("for i in 1 2 3 4 5 6; do echo progress $i; sleep 0.1; done"),
            "download",
            Duration::from_millis(400),
        )
        .unwrap();

        let (lines, outcome) = drain(stream).await;
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[5], "progress 6");
        assert!(outcome.unwrap().success());
    }

    #[tokio::test]
    async fn test_streaming_stalled_command_times_out() {
        let started = std::time::Instant::now();
        let stream =
            spawn_streaming(sh("echo started; sleep 5"), "download", Duration::from_millis(200))
                .unwrap();

        let (lines, outcome) = drain(stream).await;
        assert_eq!(lines, ["started"]);
        let err = outcome.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { ref command } if command == "download"));
        assert_eq!(err.to_string(), "command timed out");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_streaming_missing_program_is_io_error() {
        let result = spawn_streaming(
            Command::new("/nonexistent/tidal-remote-ssh"),
            "download",
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CommandError::Io { .. })));
    }

    #[tokio::test]
    async fn test_capture_collects_output() {
        let result = capture(
            sh("echo out; echo err >&2; exit 2"),
            "cat settings",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.exit_code, 2);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_capture_times_out() {
        let started = std::time::Instant::now();
        let err = capture(sh("sleep 5"), "cat settings", Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Timeout { ref command } if command == "cat settings"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_once_closed() {
        let mut session = session(Credential::Ambient);
        session.close().await;
        session.close().await;
        assert!(session.closed);
    }
}
