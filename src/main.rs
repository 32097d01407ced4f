use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing::{debug, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use tidal_remote::{
    config::{self, Config},
    media::UrlClassifier,
    orchestrator::{Intent, Orchestrator, Settings, TerminalReporter},
    remote::{Credential, SshConnector, SshTarget},
    tool::RemoteTool,
};

/// Download Tidal content via SSH using tidal-dl-ng on a remote server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SSH server hostname or IP address
    server: String,

    /// Tidal URL or ID to download (optional with --show-config or -c)
    target: Option<String>,

    /// SSH username (defaults to ssh's own choice)
    #[arg(short, long)]
    username: Option<String>,

    /// SSH port
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to SSH private key
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// SSH password (ssh prompts if not provided and key auth fails)
    #[arg(short = 'w', long)]
    password: Option<String>,

    /// Set a tidal-dl-ng config option (can be used multiple times)
    #[arg(short = 'c', long = "config", num_args = 2, value_names = ["KEY", "VALUE"], action = ArgAction::Append)]
    config: Vec<String>,

    /// Show current configuration
    #[arg(long)]
    show_config: bool,

    /// Show what would be done without executing
    #[arg(long)]
    dry_run: bool,

    /// Print download output after it finishes instead of streaming it
    #[arg(long)]
    no_progress: bool,

    /// Path to the local config file
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn intent(&self) -> Intent {
        Intent {
            target: self.target.clone(),
            mutations: self
                .config
                .chunks(2)
                .filter_map(|pair| match pair {
                    [key, value] => Some((key.clone(), value.clone())),
                    _ => None,
                })
                .collect(),
            show_config: self.show_config,
            dry_run: self.dry_run,
        }
    }

    fn settings(&self, config: &Config) -> Result<Settings> {
        let credential = match (&self.key, &self.password, &config.ssh.key) {
            (Some(key), _, _) => Credential::KeyFile(config::expand_home(key)),
            (None, Some(password), _) => Credential::Password(password.clone()),
            (None, None, Some(key)) => Credential::KeyFile(key.clone()),
            (None, None, None) => Credential::Ambient,
        };

        let classifier = UrlClassifier::new(&config.tool.domain)
            .with_context(|| format!("Invalid URL domain {:?}", config.tool.domain))?;

        Ok(Settings {
            target: SshTarget {
                host: self.server.clone(),
                user: self.username.clone().or_else(|| config.ssh.user.clone()),
                port: self.port.unwrap_or(config.ssh.port),
                credential,
            },
            tool: RemoteTool::new(&config.tool.program, &config.tool.settings_path),
            classifier,
            stream_output: !self.no_progress,
        })
    }
}

fn init_logging(format: &str, verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn cancelled() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No handler, so never cancel
        std::future::pending::<()>().await;
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = match config::locate(args.config_file.as_deref()) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    init_logging(config.get_logging_format(), args.verbose);
    debug!(?config, "Loaded configuration");

    let settings = args.settings(&config)?;
    let connector = SshConnector::new(Duration::from_secs(config.ssh.timeout_secs));
    let orchestrator = Orchestrator::new(connector, settings);

    info!("Starting tidal-remote...");
    let outcome = orchestrator
        .run(&args.intent(), &mut TerminalReporter, cancelled())
        .await;
    info!(?outcome, "Finished");

    Ok(ExitCode::from(outcome.exit_code()))
}

/// Help and version requests succeed; every other parse error is a usage
/// failure.
fn usage_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
