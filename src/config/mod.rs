//! Configuration management for context-press
//!
//! Layers, lowest priority first: built-in defaults, the TOML config file,
//! `CPRESS_*` environment variables, then command-line flags (applied by the
//! binary through [`Config::apply_overrides`]).

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::context::CompressionConfig;
use crate::llm::{ClientOptions, DEFAULT_API_BASE_URL, DEFAULT_USER_AGENT};
use crate::store::DEFAULT_MODEL;
use crate::{Error, Result};

use self::file::ConfigFile;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_VAR: &str = "CPRESS_CONFIG";

const API_KEY_VAR: &str = "CPRESS_API_KEY";
const API_BASE_URL_VAR: &str = "CPRESS_API_BASE_URL";
const MODEL_VAR: &str = "CPRESS_MODEL";
const USER_AGENT_VAR: &str = "CPRESS_USER_AGENT";
const TIMEOUT_VAR: &str = "CPRESS_TIMEOUT_SECS";
const HISTORY_WINDOW_VAR: &str = "CPRESS_HISTORY_WINDOW";
const SUMMARY_MAX_CHARS_VAR: &str = "CPRESS_SUMMARY_MAX_CHARS";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bearer token for the completion endpoint
    pub api_key: Option<String>,

    /// Base URL of the completion endpoint
    pub api_base_url: String,

    /// Model from the environment or config file, if any
    pub model: Option<String>,

    /// User agent header
    pub user_agent: String,

    /// Request timeout
    pub timeout: Duration,

    /// Compression limits
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            compression: CompressionConfig::default(),
        }
    }
}

/// Command-line values layered on top of file and environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    pub history_window_messages: Option<usize>,
    pub summary_max_chars: Option<usize>,
}

/// Trimmed, non-blank value of an environment variable
fn env_string(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Positive number from an environment variable; anything else is ignored
fn env_positive<T>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr + Default + PartialOrd,
{
    let raw = env_string(env, key)?;
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid numeric setting");
            None
        }
    }
}

/// Blank strings count as unset
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma separated model list, trimming and dropping duplicates
#[must_use]
pub fn parse_available_models(raw: &str) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for candidate in raw.split(',').map(str::trim) {
        if candidate.is_empty() || models.iter().any(|m| m == candidate) {
            continue;
        }
        models.push(candidate.to_string());
    }
    models
}

impl Config {
    /// Load configuration from the process environment and config file
    #[must_use]
    pub fn load() -> Self {
        Self::load_with_env(&|key| std::env::var(key).ok())
    }

    /// Load configuration with an explicit environment lookup
    ///
    /// The config file is read from `CPRESS_CONFIG` when set, otherwise from
    /// the standard location.
    #[must_use]
    pub fn load_with_env(env: &dyn Fn(&str) -> Option<String>) -> Self {
        let path = env_string(env, CONFIG_PATH_VAR).map(PathBuf::from);
        let file = file::load_config_file(path.as_deref());
        Self::from_sources(file, env)
    }

    /// Combine defaults, a parsed config file and the environment
    #[must_use]
    pub fn from_sources(file: ConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let compression = CompressionConfig {
            history_window_messages: env_positive(env, HISTORY_WINDOW_VAR)
                .or(file.compression.history_window_messages.filter(|n| *n > 0))
                .unwrap_or(defaults.compression.history_window_messages),
            summary_max_chars: env_positive(env, SUMMARY_MAX_CHARS_VAR)
                .or(file.compression.summary_max_chars.filter(|n| *n > 0))
                .unwrap_or(defaults.compression.summary_max_chars),
        };

        let timeout_secs = env_positive(env, TIMEOUT_VAR)
            .or(file.api.timeout_secs.filter(|n| *n > 0))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            api_key: env_string(env, API_KEY_VAR).or_else(|| non_blank(file.api.key)),
            api_base_url: env_string(env, API_BASE_URL_VAR)
                .or_else(|| non_blank(file.api.base_url))
                .unwrap_or(defaults.api_base_url),
            model: env_string(env, MODEL_VAR).or_else(|| non_blank(file.model)),
            user_agent: env_string(env, USER_AGENT_VAR)
                .or_else(|| non_blank(file.api.user_agent))
                .unwrap_or(defaults.user_agent),
            timeout: Duration::from_secs(timeout_secs),
            compression,
        }
    }

    /// Apply command-line values; zero means "not given"
    #[must_use]
    pub fn apply_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(window) = overrides.history_window_messages.filter(|n| *n > 0) {
            self.compression.history_window_messages = window;
        }
        if let Some(limit) = overrides.summary_max_chars.filter(|n| *n > 0) {
            self.compression.summary_max_chars = limit;
        }
        self
    }

    /// The API key, which completion requests require
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no key is configured
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Config(format!("missing {API_KEY_VAR}")))
    }

    /// Client settings for the completion endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no key is configured
    pub fn client_options(&self) -> Result<ClientOptions> {
        Ok(ClientOptions::new(self.require_api_key()?)
            .with_base_url(&self.api_base_url)
            .with_user_agent(&self.user_agent)
            .with_timeout(self.timeout))
    }

    /// Pick the model for a request
    ///
    /// First non-blank of: the command-line model, the configured model, the
    /// bundle's model, the default. A non-empty `available` list that does
    /// not contain the pick replaces it with its first entry.
    #[must_use]
    pub fn resolve_model(&self, cli_model: Option<&str>, bundle_model: &str, available: &[String]) -> String {
        let model = [cli_model, self.model.as_deref(), Some(bundle_model)]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
            .unwrap_or(DEFAULT_MODEL);

        match available.first() {
            Some(first) if !available.iter().any(|m| m == model) => {
                tracing::debug!(requested = model, using = %first, "model not in available list");
                first.clone()
            }
            _ => model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::file::{ApiFileConfig, CompressionFileConfig};

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_any_source() {
        let config = Config::from_sources(ConfigFile::default(), &env_from(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.compression.history_window_messages, 14);
        assert_eq!(config.compression.summary_max_chars, 1800);
    }

    #[test]
    fn environment_beats_file() {
        let file = ConfigFile {
            api: ApiFileConfig {
                key: Some("file-key".into()),
                base_url: Some("http://file/v1".into()),
                user_agent: None,
                timeout_secs: Some(10),
            },
            model: Some("file-model".into()),
            compression: CompressionFileConfig {
                history_window_messages: Some(6),
                summary_max_chars: Some(900),
            },
        };
        let env = env_from(&[
            ("CPRESS_API_KEY", " env-key "),
            ("CPRESS_MODEL", "env-model"),
            ("CPRESS_HISTORY_WINDOW", "8"),
        ]);

        let config = Config::from_sources(file, &env);

        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.api_base_url, "http://file/v1");
        assert_eq!(config.model.as_deref(), Some("env-model"));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.compression.history_window_messages, 8);
        assert_eq!(config.compression.summary_max_chars, 900);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let env = env_from(&[
            ("CPRESS_HISTORY_WINDOW", "0"),
            ("CPRESS_SUMMARY_MAX_CHARS", "lots"),
            ("CPRESS_TIMEOUT_SECS", "-4"),
        ]);
        let config = Config::from_sources(ConfigFile::default(), &env);
        assert_eq!(config.compression, CompressionConfig::default());
        assert_eq!(config.timeout, Duration::from_secs(300));
    }

    #[test]
    fn blank_values_are_unset() {
        let env = env_from(&[("CPRESS_API_KEY", "   ")]);
        let file = ConfigFile {
            model: Some("  ".into()),
            ..ConfigFile::default()
        };
        let config = Config::from_sources(file, &env);
        assert!(config.api_key.is_none());
        assert!(config.model.is_none());
        assert!(matches!(config.require_api_key(), Err(Error::Config(_))));
    }

    #[test]
    fn overrides_ignore_zero() {
        let config = Config::default().apply_overrides(Overrides {
            history_window_messages: Some(0),
            summary_max_chars: Some(500),
        });
        assert_eq!(config.compression.history_window_messages, 14);
        assert_eq!(config.compression.summary_max_chars, 500);
    }

    #[test]
    fn config_file_path_comes_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "model = \"from-file\"\n").unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let config = Config::load_with_env(&env_from(&[("CPRESS_CONFIG", path_str.as_str())]));
        assert_eq!(config.model.as_deref(), Some("from-file"));
    }

    #[test]
    fn available_models_are_trimmed_and_deduped() {
        assert_eq!(
            parse_available_models(" a, b ,a,, c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(parse_available_models("  ").is_empty());
    }

    #[test]
    fn model_resolution_order() {
        let mut config = Config::default();
        assert_eq!(config.resolve_model(None, "", &[]), DEFAULT_MODEL);
        assert_eq!(config.resolve_model(None, "bundle", &[]), "bundle");

        config.model = Some("configured".into());
        assert_eq!(config.resolve_model(None, "bundle", &[]), "configured");
        assert_eq!(config.resolve_model(Some(" cli "), "bundle", &[]), "cli");
        assert_eq!(config.resolve_model(Some(""), "bundle", &[]), "configured");
    }

    #[test]
    fn model_outside_available_list_is_replaced() {
        let config = Config::default();
        let available = vec!["x".to_string(), "y".to_string()];
        assert_eq!(config.resolve_model(Some("y"), "", &available), "y");
        assert_eq!(config.resolve_model(Some("z"), "", &available), "x");
    }

    #[test]
    fn client_options_require_key() {
        let config = Config {
            api_key: Some("k".into()),
            api_base_url: "http://local/v1".into(),
            ..Config::default()
        };
        let options = config.client_options().unwrap();
        assert_eq!(options.api_key, "k");
        assert_eq!(options.base_url, "http://local/v1");
        assert!(Config::default().client_options().is_err());
    }
}
