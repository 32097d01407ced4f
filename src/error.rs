use thiserror::Error;

/// Input that is neither a recognized media URL nor a bare numeric ID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {input}")]
pub struct ClassificationError {
    pub reason: &'static str,
    pub input: String,
}

impl ClassificationError {
    pub fn unrecognized(input: &str) -> Self {
        Self {
            reason: "unrecognized URL",
            input: input.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("a target URL or ID is required unless --show-config or --config is given")]
pub struct UsageError;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("{program} not found, install it to use this authentication method")]
    MissingProgram { program: &'static str },

    #[error("failed to connect to {destination}: {stderr}")]
    Rejected { destination: String, stderr: String },

    #[error("timed out connecting to {destination}")]
    Timeout { destination: String },

    #[error("failed to start ssh: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectError {
    /// Troubleshooting tips for the usual authentication failures.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Rejected { stderr, .. }
                if stderr.contains("Permission denied")
                    || stderr.contains("Host key verification failed") =>
            {
                Some(
                    "Check the SSH credentials and key setup, pass --key or --password, \
                     or make sure key authentication is configured on the server",
                )
            }
            Self::MissingProgram { program: "sshpass" } => {
                Some("Password authentication needs sshpass; alternatively use --key")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("command timed out")]
    Timeout { command: String },

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` ended without reporting an exit status")]
    Interrupted { command: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to set {key}: {stderr}")]
    Rejected { key: String, stderr: String },

    #[error("failed to set {key}: {source}")]
    Transport {
        key: String,
        #[source]
        source: CommandError,
    },
}
