mod settings;

pub use settings::ConfigDocument;

use crate::{
    error::ConfigError,
    remote::RemoteSession,
    utils::shell_quote,
};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DEFAULT_PROGRAM: &str = "tidal-dl-ng";
pub const DEFAULT_SETTINGS_PATH: &str = ".config/tidal_dl_ng/settings.json";

/// The downloader installed on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTool {
    program: String,
    /// Settings file, relative to the remote home directory
    settings_path: String,
}

impl Default for RemoteTool {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_SETTINGS_PATH)
    }
}

impl RemoteTool {
    pub fn new(program: &str, settings_path: &str) -> Self {
        Self {
            program: program.to_string(),
            settings_path: settings_path.trim_start_matches('/').to_string(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn download_command(&self, url: &str) -> String {
        format!("{} dl {}", self.program, shell_quote(url))
    }

    pub fn set_command(&self, key: &str, value: &str) -> String {
        format!(
            "{} cfg {} {}",
            self.program,
            shell_quote(key),
            shell_quote(value)
        )
    }

    /// Read the tool's settings file. A missing or unparsable file is an
    /// ordinary state and yields an empty document.
    pub async fn fetch(&self, session: &dyn RemoteSession) -> ConfigDocument {
        let home = match session.run("echo $HOME").await {
            Ok(result) if result.success() => result.stdout.trim().to_string(),
            Ok(result) => {
                warn!("Failed to get home directory: {}", result.stderr.trim());
                return ConfigDocument::default();
            }
            Err(e) => {
                warn!("Failed to get home directory: {}", e);
                return ConfigDocument::default();
            }
        };

        if home.is_empty() {
            warn!("Remote home directory is empty");
            return ConfigDocument::default();
        }

        let path = format!("{}/{}", home.trim_end_matches('/'), self.settings_path);
        debug!("Reading settings from {}", path);

        let contents = match session.run(&format!("cat {}", shell_quote(&path))).await {
            Ok(result) if result.success() => result.stdout,
            Ok(result) => {
                warn!(
                    "Failed to read config file {}: {}",
                    path,
                    result.stderr.trim()
                );
                return ConfigDocument::default();
            }
            Err(e) => {
                warn!("Failed to read config file {}: {}", path, e);
                return ConfigDocument::default();
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(value) if value.is_object() => ConfigDocument::flatten(&value),
            Ok(_) => {
                warn!("Config file {} does not contain a JSON object", path);
                ConfigDocument::default()
            }
            Err(e) => {
                warn!("Failed to parse config JSON from {}: {}", path, e);
                ConfigDocument::default()
            }
        }
    }

    /// Set one option through the tool's own `cfg` subcommand. Keys are not
    /// validated here; the tool decides what is valid.
    pub async fn set(
        &self,
        session: &dyn RemoteSession,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let result = session
            .run(&self.set_command(key, value))
            .await
            .map_err(|source| ConfigError::Transport {
                key: key.to_string(),
                source,
            })?;

        if !result.success() {
            let stderr = match result.stderr.trim() {
                "" => format!("exit code {}", result.exit_code),
                stderr => stderr.to_string(),
            };
            return Err(ConfigError::Rejected {
                key: key.to_string(),
                stderr,
            });
        }

        info!("Set {} = {}", key, value);
        Ok(())
    }
}
