mod session;
mod ssh;
mod stream;

#[cfg(test)]
pub mod scripted;

pub use session::{CommandResult, Connector, Credential, RemoteSession, SshTarget};
pub use ssh::SshConnector;
pub use stream::{StreamOutcome, StreamSender, StreamingCommand};
