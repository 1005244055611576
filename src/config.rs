//! Configuration loading and management

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

/// Environment variable overriding the bindings file location
pub const CONFIG_PATH_ENV: &str = "KEYBIND_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// JSON file holding the command URI and key bindings
    pub config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = PathBuf::from(std::env::var("HOME")?);
        let data_dir = home.join(".local").join("share").join("keybind-daemon");
        let socket_path = data_dir.join("daemon.sock");

        let config_path = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => PathBuf::from(path),
            None => home.join(".config").join("keybind-daemon").join("config.json"),
        };

        Ok(Self {
            socket_path,
            data_dir,
            config_path,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Errors reading the bindings file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of the bindings file
///
/// ```json
/// {
///   "command_uri": "http://localhost:8080/command/{command}",
///   "bindings": { "CTRL+SHIFT+P": "play:applause", "ALT+M": "mute" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KeybindConfig {
    /// Command endpoint template; `{command}` or `{0}` is replaced
    #[serde(default, alias = "CommandUri")]
    pub command_uri: Option<String>,

    /// Expression -> command; null commands count as blank
    #[serde(default, alias = "Bindings")]
    bindings: Option<BTreeMap<String, Option<String>>>,
}

impl KeybindConfig {
    /// Read the file at `path`; a missing file is an empty configuration
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Parse configuration JSON; blank content is an empty configuration
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content)
    }

    /// Binding entries with absent commands mapped to empty strings
    pub fn bindings(&self) -> BTreeMap<String, String> {
        self.bindings
            .iter()
            .flatten()
            .map(|(expr, cmd)| (expr.clone(), cmd.clone().unwrap_or_default()))
            .collect()
    }
}
