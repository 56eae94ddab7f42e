//! Configuration
//!
//! Layered configuration for the chat core. Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. TOML file (`$XDG_CONFIG_HOME/assistant/config.toml` or an explicit path)
//! 3. Environment variables
//!
//! Surfaces may apply their own overrides (CLI flags) on top.
//!
//! # Environment Variables
//!
//! - `ASSISTANT_BASE_URL`: backend origin (default: `http://localhost:3000`)
//! - `ASSISTANT_RESPONSE_TIMEOUT_MS`: deadline for a whole response, 0 = none
//! - `ASSISTANT_CONNECT_TIMEOUT_MS`: TCP connect timeout
//! - `ASSISTANT_DECODE_MODE`: `strict` or `lossy`
//!
//! # File Format
//!
//! ```toml
//! base_url = "http://localhost:3000"
//! response_timeout_ms = 60000
//! connect_timeout_ms = 5000
//! decode_mode = "lossy"
//! event_buffer = 256
//! ```
//!
//! The request path is always [`CHAT_ENDPOINT`]; only the origin is
//! configurable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::streaming::DecodeMode;

/// Fixed request path on the backend
pub const CHAT_ENDPOINT: &str = "/api/chat";

/// Backend origin used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying parse error
        source: toml::de::Error,
    },

    /// A value is syntactically fine but unusable
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Setting name
        key: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Settings as they appear in the TOML file
///
/// Every field is optional; absent fields leave the lower layer untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfigFile {
    /// Backend origin
    pub base_url: Option<String>,
    /// Response deadline in milliseconds (0 = none)
    pub response_timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// UTF-8 handling
    pub decode_mode: Option<DecodeMode>,
    /// Capacity of the renderer event channel
    pub event_buffer: Option<usize>,
}

/// Chat core configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Backend origin, e.g. `http://localhost:3000`
    pub base_url: String,
    /// Deadline for a whole response, measured from submission (None = wait forever)
    pub response_timeout: Option<Duration>,
    /// TCP connect timeout for the HTTP transport
    pub connect_timeout: Duration,
    /// How to treat invalid UTF-8 in responses
    pub decode_mode: DecodeMode,
    /// Capacity of the renderer event channel
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            response_timeout: None,
            connect_timeout: Duration::from_secs(10),
            decode_mode: DecodeMode::Strict,
            event_buffer: 100,
        }
    }
}

impl ChatConfig {
    /// Defaults plus environment overrides
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Defaults, then the config file, then the environment
    ///
    /// With `path = None` the default location is used and a missing file is
    /// fine. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match path {
            Some(path) => config.apply_file(load_config_from_path(path)?),
            None => {
                if let Some(path) = default_config_path().filter(|p| p.exists()) {
                    config.apply_file(load_config_from_path(&path)?);
                }
            }
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Full URL of the chat endpoint
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), CHAT_ENDPOINT)
    }

    /// Overlay values from a parsed config file
    pub fn apply_file(&mut self, file: ChatConfigFile) {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(ms) = file.response_timeout_ms {
            self.response_timeout = timeout_from_ms(ms);
        }
        if let Some(ms) = file.connect_timeout_ms {
            self.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = file.decode_mode {
            self.decode_mode = mode;
        }
        if let Some(buffer) = file.event_buffer {
            self.event_buffer = buffer;
        }
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary variable lookup
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup("ASSISTANT_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ASSISTANT_RESPONSE_TIMEOUT_MS") {
            self.response_timeout = timeout_from_ms(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ASSISTANT_CONNECT_TIMEOUT_MS") {
            self.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = parse_var::<DecodeMode>(&lookup, "ASSISTANT_DECODE_MODE") {
            self.decode_mode = mode;
        }
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "base_url",
            message: format!("'{}' is not a URL: {e}", self.base_url),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "base_url",
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "event_buffer",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Default config file location
///
/// `$XDG_CONFIG_HOME/assistant/config.toml` (or the platform equivalent).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("assistant").join("config.toml"))
}

/// Read and parse a config file
pub fn load_config_from_path(path: &Path) -> Result<ChatConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = ?path, "Loaded config file");
    Ok(file)
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = key, value = %raw, error = %e, "Ignoring invalid environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.response_timeout, None);
        assert_eq!(config.decode_mode, DecodeMode::Strict);
        assert_eq!(config.endpoint_url(), "http://localhost:3000/api/chat");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_url_trims_trailing_slash() {
        let config = ChatConfig {
            base_url: "https://assistant.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.endpoint_url(), "https://assistant.example.com/api/chat");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ChatConfig::default();
        config.apply_env_with(lookup(&[
            ("ASSISTANT_BASE_URL", "http://10.0.0.2:8080"),
            ("ASSISTANT_RESPONSE_TIMEOUT_MS", "1500"),
            ("ASSISTANT_DECODE_MODE", "lossy"),
        ]));

        assert_eq!(config.base_url, "http://10.0.0.2:8080");
        assert_eq!(config.response_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.decode_mode, DecodeMode::Lossy);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = ChatConfig::default();
        config.apply_env_with(lookup(&[
            ("ASSISTANT_CONNECT_TIMEOUT_MS", "soon"),
            ("ASSISTANT_DECODE_MODE", "utf16"),
        ]));
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut config = ChatConfig {
            response_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        config.apply_env_with(lookup(&[("ASSISTANT_RESPONSE_TIMEOUT_MS", "0")]));
        assert_eq!(config.response_timeout, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
base_url = "http://chat.local:9000"
response_timeout_ms = 30000
decode_mode = "lossy"
event_buffer = 8
"#
        )
        .unwrap();

        let parsed = load_config_from_path(file.path()).unwrap();
        let mut config = ChatConfig::default();
        config.apply_file(parsed);

        assert_eq!(config.base_url, "http://chat.local:9000");
        assert_eq!(config.response_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.decode_mode, DecodeMode::Lossy);
        assert_eq!(config.event_buffer, 8);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "endpoint = \"/v2/chat\"").unwrap();

        let err = load_config_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChatConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = ChatConfig {
            base_url: "localhost:3000/chat".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "base_url", .. })
        ));

        let config = ChatConfig {
            base_url: "ftp://files.example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let config = ChatConfig {
            event_buffer: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "event_buffer", .. })
        ));
    }
}
