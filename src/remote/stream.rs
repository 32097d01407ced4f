use crate::error::CommandError;
use tokio::sync::{mpsc, oneshot};

const LINE_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub exit_code: i32,
    pub stderr: String,
}

impl StreamOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

type OutcomeResult = Result<StreamOutcome, CommandError>;

/// Output of a running remote command: a finite sequence of stdout lines,
/// followed by the exit status once the sequence is exhausted.
#[derive(Debug)]
pub struct StreamingCommand {
    command: String,
    lines: mpsc::Receiver<String>,
    outcome: oneshot::Receiver<OutcomeResult>,
}

/// Producer half of a [`StreamingCommand`].
#[derive(Debug)]
pub struct StreamSender {
    lines: mpsc::Sender<String>,
    outcome: oneshot::Sender<OutcomeResult>,
}

impl StreamingCommand {
    pub fn channel(command: &str) -> (StreamSender, StreamingCommand) {
        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        (
            StreamSender {
                lines: line_tx,
                outcome: outcome_tx,
            },
            StreamingCommand {
                command: command.to_string(),
                lines: line_rx,
                outcome: outcome_rx,
            },
        )
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Next stdout line, or `None` once the remote side closed its output.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Drain any unread lines and wait for the exit status.
    pub async fn finish(mut self) -> Result<StreamOutcome, CommandError> {
        while self.lines.recv().await.is_some() {}

        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CommandError::Interrupted {
                command: self.command,
            }),
        }
    }
}

impl StreamSender {
    /// Returns false once the consumer has gone away.
    pub async fn line(&self, line: String) -> bool {
        self.lines.send(line).await.is_ok()
    }

    /// Close the line sequence and publish the final outcome.
    pub fn complete(self, outcome: OutcomeResult) {
        let StreamSender { lines, outcome: tx } = self;
        drop(lines);
        let _ = tx.send(outcome);
    }
}
