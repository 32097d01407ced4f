use super::stream::StreamingCommand;
use crate::error::{CommandError, ConnectError};
use async_trait::async_trait;
use std::{fmt, path::PathBuf};

#[derive(Clone)]
pub enum Credential {
    /// Private key file passed to `ssh -i`
    KeyFile(PathBuf),
    /// Explicit password, handed to `sshpass` through the environment
    Password(String),
    /// Agent and default keys, falling back to an interactive password prompt
    Ambient,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::Ambient => f.write_str("Ambient"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    /// `None` leaves the choice to ssh (current user or ~/.ssh/config)
    pub user: Option<String>,
    pub port: u16,
    pub credential: Credential,
}

impl SshTarget {
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}:{}", user, self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One authenticated command-execution channel to a remote host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit code is returned as a normal result; `Err` means the
    /// command could not be run or did not finish in time.
    async fn run(&self, command: &str) -> Result<CommandResult, CommandError>;

    /// Start a command and hand back its stdout line by line as it arrives.
    async fn run_streaming(&self, command: &str) -> Result<StreamingCommand, CommandError>;

    /// Release the channel. Calling it more than once is a no-op.
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>, ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_redacted() {
        let credential = Credential::Password("hunter2".to_string());
        let debug = format!("{credential:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_destination() {
        let mut target = SshTarget {
            host: "nas.local".to_string(),
            user: None,
            port: 22,
            credential: Credential::Ambient,
        };
        assert_eq!(target.destination(), "nas.local:22");

        target.user = Some("music".to_string());
        assert_eq!(target.destination(), "music@nas.local:22");
    }
}
