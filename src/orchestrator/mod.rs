mod report;

pub use report::{render_table, Report, Reporter, TerminalReporter};

use crate::{
    error::{CommandError, UsageError},
    media::{MediaReference, UrlClassifier},
    remote::{Connector, RemoteSession, SshTarget},
    tool::RemoteTool,
};
use std::future::Future;
use tracing::{debug, info, warn};

/// What the user asked for in one invocation.
#[derive(Debug, Clone, Default)]
pub struct Intent {
    /// URL or bare ID to download
    pub target: Option<String>,
    /// Config writes, applied in order
    pub mutations: Vec<(String, String)>,
    pub show_config: bool,
    pub dry_run: bool,
}

impl Intent {
    fn has_config_actions(&self) -> bool {
        self.show_config || !self.mutations.is_empty()
    }

    pub fn validate(&self) -> Result<(), UsageError> {
        if self.target.is_none() && !self.has_config_actions() {
            return Err(UsageError);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
            // 128 + SIGINT
            Self::Cancelled => 130,
        }
    }
}

/// Everything the orchestrator needs besides the transport.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target: SshTarget,
    pub tool: RemoteTool,
    pub classifier: UrlClassifier,
    /// Render download output line by line instead of after completion
    pub stream_output: bool,
}

pub struct Orchestrator<C> {
    connector: C,
    settings: Settings,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(connector: C, settings: Settings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Run one invocation to completion. `cancel` resolving aborts the
    /// in-flight step; the session is closed on every path that opened one.
    pub async fn run<F>(&self, intent: &Intent, reporter: &mut dyn Reporter, cancel: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = intent.validate() {
            reporter.report(Report::Usage(&e));
            return Outcome::Failed;
        }

        let mut failures = 0;

        let reference = match &intent.target {
            Some(target) => match self.settings.classifier.classify(target) {
                Ok(reference) => {
                    reporter.report(Report::Detected(&reference));
                    Some(reference)
                }
                Err(e) => {
                    reporter.report(Report::ClassificationFailed(&e));
                    if !intent.has_config_actions() {
                        return Outcome::Failed;
                    }
                    failures += 1;
                    None
                }
            },
            None => None,
        };

        tokio::pin!(cancel);

        let destination = self.settings.target.destination();
        reporter.report(Report::Connecting(&destination));

        let connected = tokio::select! {
            result = self.connector.connect(&self.settings.target) => Some(result),
            _ = &mut cancel => None,
        };

        let mut session = match connected {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                reporter.report(Report::ConnectFailed(&e));
                return Outcome::Failed;
            }
            None => {
                reporter.report(Report::Cancelled);
                return Outcome::Cancelled;
            }
        };
        reporter.report(Report::Connected);

        let steps = tokio::select! {
            failed = self.execute(session.as_ref(), intent, reference.as_ref(), reporter) => Some(failed),
            _ = &mut cancel => None,
        };

        session.close().await;

        match steps {
            None => {
                warn!("Cancelled, session closed");
                reporter.report(Report::Cancelled);
                Outcome::Cancelled
            }
            Some(failed) => {
                failures += failed;
                if failures == 0 {
                    Outcome::Succeeded
                } else {
                    info!("{} action(s) failed", failures);
                    Outcome::Failed
                }
            }
        }
    }

    /// Config writes, config display, then the download. Returns the number
    /// of failed actions.
    async fn execute(
        &self,
        session: &dyn RemoteSession,
        intent: &Intent,
        reference: Option<&MediaReference>,
        reporter: &mut dyn Reporter,
    ) -> usize {
        let tool = &self.settings.tool;
        let mut failures = 0;

        if !intent.mutations.is_empty() {
            reporter.report(Report::ApplyingConfig);
        }
        for (key, value) in &intent.mutations {
            if intent.dry_run {
                reporter.report(Report::WouldSet { key, value });
                continue;
            }
            match tool.set(session, key, value).await {
                Ok(()) => reporter.report(Report::ConfigSet { key, value }),
                Err(e) => {
                    reporter.report(Report::ConfigFailed(&e));
                    failures += 1;
                }
            }
        }

        if intent.show_config {
            reporter.report(Report::FetchingConfig);
            let doc = tool.fetch(session).await;
            debug!("Fetched {} config entries", doc.len());
            reporter.report(Report::Config(&doc));
        }

        if let (Some(reference), Some(target)) = (reference, &intent.target) {
            let url = target.as_str();
            if intent.dry_run {
                reporter.report(Report::WouldDownload(url));
            } else {
                info!("Downloading {} {}", reference.kind(), reference.id());
                reporter.report(Report::DownloadStarted(reference.kind()));
                match self.download(session, url, reporter).await {
                    Ok(()) => reporter.report(Report::DownloadSucceeded),
                    Err(e) => {
                        reporter.report(Report::DownloadFailed(&e));
                        failures += 1;
                    }
                }
            }
        }

        failures
    }

    async fn download(
        &self,
        session: &dyn RemoteSession,
        url: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<(), CommandError> {
        let command = self.settings.tool.download_command(url);

        let (exit_code, stderr) = if self.settings.stream_output {
            let mut stream = session.run_streaming(&command).await?;
            while let Some(line) = stream.next_line().await {
                reporter.report(Report::Output(line.trim()));
            }
            let outcome = stream.finish().await?;
            (outcome.exit_code, outcome.stderr)
        } else {
            let result = session.run(&command).await?;
            for line in result.stdout.lines() {
                reporter.report(Report::Output(line.trim()));
            }
            (result.exit_code, result.stderr)
        };

        if exit_code != 0 {
            return Err(CommandError::Failed {
                command,
                exit_code,
                stderr,
            });
        }

        Ok(())
    }
}
