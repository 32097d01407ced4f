//! Call-recording session double for tests.

use super::{
    session::{CommandResult, Connector, RemoteSession, SshTarget},
    stream::{StreamOutcome, StreamingCommand},
};
use crate::error::{CommandError, ConnectError};
use async_trait::async_trait;
use std::{
    io,
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone)]
enum Response {
    Complete(CommandResult),
    Stream {
        lines: Vec<String>,
        exit_code: i32,
        stderr: String,
    },
    Broken,
    Hang,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<(String, Response)>,
    refuse_connect: Option<String>,
    connects: usize,
    calls: Vec<String>,
    closes: usize,
}

/// Canned responses keyed by a substring of the command. The first matching
/// rule wins; unmatched commands succeed with no output.
#[derive(Debug, Clone, Default)]
pub struct Script {
    state: Arc<Mutex<State>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(self, needle: &str, response: Response) -> Self {
        self.state
            .lock()
            .unwrap()
            .rules
            .push((needle.to_string(), response));
        self
    }

    pub fn respond(self, needle: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.rule(
            needle,
            Response::Complete(CommandResult {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            }),
        )
    }

    pub fn stream(self, needle: &str, lines: &[&str], exit_code: i32, stderr: &str) -> Self {
        self.rule(
            needle,
            Response::Stream {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                exit_code,
                stderr: stderr.to_string(),
            },
        )
    }

    /// The transport fails before the command runs.
    pub fn broken(self, needle: &str) -> Self {
        self.rule(needle, Response::Broken)
    }

    /// The command never finishes.
    pub fn hang(self, needle: &str) -> Self {
        self.rule(needle, Response::Hang)
    }

    pub fn refuse_connect(self, stderr: &str) -> Self {
        self.state.lock().unwrap().refuse_connect = Some(stderr.to_string());
        self
    }

    pub fn connector(&self) -> ScriptedConnector {
        ScriptedConnector {
            script: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    fn lookup(&self, command: &str) -> Option<Response> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(command.to_string());
        state
            .rules
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
    }
}

pub struct ScriptedConnector {
    script: Script,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>, ConnectError> {
        let refusal = {
            let mut state = self.script.state.lock().unwrap();
            state.connects += 1;
            state.refuse_connect.clone()
        };

        match refusal {
            Some(stderr) => Err(ConnectError::Rejected {
                destination: target.destination(),
                stderr,
            }),
            None => Ok(Box::new(ScriptedSession {
                script: self.script.clone(),
            })),
        }
    }
}

pub struct ScriptedSession {
    script: Script,
}

fn broken(command: &str) -> CommandError {
    CommandError::Io {
        command: command.to_string(),
        source: io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"),
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(&self, command: &str) -> Result<CommandResult, CommandError> {
        match self.script.lookup(command) {
            None => Ok(CommandResult::default()),
            Some(Response::Complete(result)) => Ok(result),
            Some(Response::Stream {
                lines,
                exit_code,
                stderr,
            }) => Ok(CommandResult {
                stdout: lines.join("\n"),
                stderr,
                exit_code,
            }),
            Some(Response::Broken) => Err(broken(command)),
            Some(Response::Hang) => std::future::pending().await,
        }
    }

    async fn run_streaming(&self, command: &str) -> Result<StreamingCommand, CommandError> {
        let (lines, exit_code, stderr) = match self.script.lookup(command) {
            None => (Vec::new(), 0, String::new()),
            Some(Response::Stream {
                lines,
                exit_code,
                stderr,
            }) => (lines, exit_code, stderr),
            Some(Response::Complete(result)) => (
                result.stdout.lines().map(str::to_string).collect(),
                result.exit_code,
                result.stderr,
            ),
            Some(Response::Broken) => return Err(broken(command)),
            Some(Response::Hang) => std::future::pending().await,
        };

        let (sender, stream) = StreamingCommand::channel(command);
        tokio::spawn(async move {
            for line in lines {
                sender.line(line).await;
            }
            sender.complete(Ok(StreamOutcome { exit_code, stderr }));
        });

        Ok(stream)
    }

    async fn close(&mut self) {
        self.script.state.lock().unwrap().closes += 1;
    }
}
