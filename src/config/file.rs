//! TOML configuration file loading
//!
//! Supports `~/.config/context-press/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ConfigFile {
    /// Completion endpoint settings
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Default model identifier
    pub model: Option<String>,

    /// Context compression limits
    #[serde(default)]
    pub compression: CompressionFileConfig,
}

/// Completion endpoint configuration
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ApiFileConfig {
    /// Bearer token
    pub key: Option<String>,

    /// Base URL, without `/chat/completions`
    pub base_url: Option<String>,

    /// User agent header
    pub user_agent: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Compression limits
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct CompressionFileConfig {
    /// Recent messages kept near-verbatim
    pub history_window_messages: Option<usize>,

    /// Character budget for the digest of older turns
    pub summary_max_chars: Option<usize>,
}

/// Parse a config document
///
/// # Errors
///
/// Returns error if the document is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> ConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/context-press/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("context-press").join("config.toml"))
}
