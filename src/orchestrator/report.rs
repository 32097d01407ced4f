use crate::{
    error::{ClassificationError, CommandError, ConfigError, ConnectError, UsageError},
    media::{MediaKind, MediaReference},
    tool::ConfigDocument,
};
use std::fmt;

/// Something the orchestrator wants the user to see.
#[derive(Debug)]
pub enum Report<'a> {
    Usage(&'a UsageError),
    Detected(&'a MediaReference),
    ClassificationFailed(&'a ClassificationError),
    Connecting(&'a str),
    Connected,
    ConnectFailed(&'a ConnectError),
    ApplyingConfig,
    ConfigSet { key: &'a str, value: &'a str },
    WouldSet { key: &'a str, value: &'a str },
    ConfigFailed(&'a ConfigError),
    FetchingConfig,
    Config(&'a ConfigDocument),
    DownloadStarted(MediaKind),
    Output(&'a str),
    DownloadSucceeded,
    DownloadFailed(&'a CommandError),
    WouldDownload(&'a str),
    Cancelled,
}

impl Report<'_> {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Usage(_)
                | Self::ClassificationFailed(_)
                | Self::ConnectFailed(_)
                | Self::ConfigFailed(_)
                | Self::DownloadFailed(_)
        )
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(e) => write!(f, "Error: {e}"),
            Self::Detected(reference) => write!(f, "Detected {reference}"),
            Self::ClassificationFailed(e) => write!(f, "Could not parse Tidal URL: {e}"),
            Self::Connecting(destination) => write!(f, "Connecting to {destination}..."),
            Self::Connected => write!(f, "Connected successfully!"),
            Self::ConnectFailed(e) => match e.hint() {
                Some(hint) => write!(f, "{e}\nTip: {hint}"),
                None => write!(f, "{e}"),
            },
            Self::ApplyingConfig => write!(f, "Applying configuration changes..."),
            Self::ConfigSet { key, value } => write!(f, "Set {key} = {value}"),
            Self::WouldSet { key, value } => write!(f, "Would set {key} = {value}"),
            Self::ConfigFailed(e) => write!(f, "{e}"),
            Self::FetchingConfig => write!(f, "Fetching current configuration..."),
            Self::Config(doc) => f.write_str(&render_table(doc)),
            Self::DownloadStarted(kind) => write!(f, "Starting download of {kind}..."),
            Self::Output(line) => f.write_str(line),
            Self::DownloadSucceeded => write!(f, "Download completed successfully!"),
            Self::DownloadFailed(CommandError::Failed { stderr, .. }) => {
                write!(f, "Download failed: {}", stderr.trim())
            }
            Self::DownloadFailed(e) => write!(f, "Download failed: {e}"),
            Self::WouldDownload(url) => write!(f, "Would download: {url}"),
            Self::Cancelled => write!(f, "Operation cancelled by user"),
        }
    }
}

/// Two-column option/value table, rows sorted by key.
pub fn render_table(doc: &ConfigDocument) -> String {
    if doc.is_empty() {
        return "No configuration found".to_string();
    }

    let width = doc
        .iter()
        .map(|(key, _)| key.chars().count())
        .max()
        .unwrap_or(0)
        .max("Option".len());

    let mut table = String::from("Current configuration\n");
    table.push_str(&format!("{:<width$}  Value\n", "Option"));
    table.push_str(&format!("{}  {}\n", "-".repeat(width), "-".repeat(5)));
    for (key, value) in doc.iter() {
        table.push_str(&format!("{key:<width$}  {value}\n"));
    }
    table.pop();
    table
}

pub trait Reporter {
    fn report(&mut self, report: Report<'_>);
}

/// Prints reports to the terminal: errors to stderr, everything else to stdout.
#[derive(Debug, Default)]
pub struct TerminalReporter;

impl Reporter for TerminalReporter {
    fn report(&mut self, report: Report<'_>) {
        if report.is_error() {
            eprintln!("{report}");
        } else {
            println!("{report}");
        }
    }
}
