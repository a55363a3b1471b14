//! Configuration system for the prayerlink client
//!
//! Configuration is loaded from a TOML file with serde defaults for every
//! field, so an empty file (or no file at all) yields a working local setup.
//! The broker URL can be given directly, or derived from the page origin the
//! client is embedded behind (`https` origins map to `wss`, `http` to `ws`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub backoff: BackoffSection,
    #[serde(default)]
    pub batch: BatchSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Explicit WebSocket broker URL (ws:// or wss://). Takes precedence
    /// over `page_origin` when set.
    pub url: Option<String>,
    /// HTTP(S) origin to derive the broker URL from when `url` is unset.
    /// Scheme maps https -> wss and http -> ws; the broker endpoint path
    /// is `/ws` on the same host.
    pub page_origin: Option<String>,
    /// Heartbeat interval in seconds, used in both directions (default: 10)
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Connect attempt timeout in seconds (default: 15)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_heartbeat_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: None,
            page_origin: None,
            heartbeat_secs: default_heartbeat_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Reconnection backoff settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffSection {
    /// Delay before the first retry in milliseconds (default: 1000)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on the retry delay in milliseconds (default: 30000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt (default: 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Symmetric jitter fraction in [0, 1] (default: 0.1)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Action batching settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSection {
    /// Flush interval for accumulated actions in milliseconds (default: 500)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    500
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "backoff.initial_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.backoff.max_delay_ms < self.backoff.initial_delay_ms {
            return Err(ConfigError::InvalidConfig(
                "backoff.max_delay_ms must be >= backoff.initial_delay_ms".to_string(),
            ));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(ConfigError::InvalidConfig(
                "backoff.multiplier must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter_factor) {
            return Err(ConfigError::InvalidConfig(
                "backoff.jitter_factor must be within [0, 1]".to_string(),
            ));
        }
        if self.batch.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch.flush_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.broker.heartbeat_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.heartbeat_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the effective WebSocket broker URL.
    ///
    /// Precedence: explicit `broker.url`, then derivation from
    /// `broker.page_origin`, then the local development default.
    pub fn resolve_broker_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.broker.url {
            let parsed =
                Url::parse(url).map_err(|_| ConfigError::InvalidBrokerUrl(url.clone()))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(ConfigError::InvalidBrokerUrl(url.clone()));
            }
            return Ok(url.clone());
        }

        if let Some(origin) = &self.broker.page_origin {
            return derive_ws_url(origin);
        }

        Ok("ws://localhost:8080/ws".to_string())
    }

    /// Heartbeat interval as a [`Duration`]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.broker.heartbeat_secs)
    }

    /// Connect attempt timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.connect_timeout_secs)
    }

    /// Flush interval as a [`Duration`]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.batch.flush_interval_ms)
    }
}

/// Derive a broker URL from an HTTP(S) page origin: https -> wss, http -> ws,
/// endpoint path `/ws` on the same host.
pub fn derive_ws_url(origin: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(origin).map_err(|_| ConfigError::InvalidBrokerUrl(origin.to_string()))?;

    let ws_scheme = match parsed.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return Err(ConfigError::InvalidBrokerUrl(origin.to_string())),
    };

    let host = parsed
        .host_str()
        .ok_or_else(|| ConfigError::InvalidBrokerUrl(origin.to_string()))?;

    Ok(match parsed.port() {
        Some(port) => format!("{ws_scheme}://{host}:{port}/ws"),
        None => format!("{ws_scheme}://{host}/ws"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.broker.heartbeat_secs, 10);
        assert_eq!(config.backoff.initial_delay_ms, 1000);
        assert_eq!(config.backoff.max_delay_ms, 30_000);
        assert_eq!(config.backoff.multiplier, 2.0);
        assert_eq!(config.backoff.jitter_factor, 0.1);
        assert_eq!(config.batch.flush_interval_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_overrides() {
        let toml_content = r#"
[broker]
url = "wss://feed.example.com/ws"

[backoff]
initial_delay_ms = 250
max_delay_ms = 10000

[batch]
flush_interval_ms = 200
"#;
        let config: ClientConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.broker.url.as_deref(), Some("wss://feed.example.com/ws"));
        assert_eq!(config.backoff.initial_delay_ms, 250);
        assert_eq!(config.backoff.multiplier, 2.0); // untouched default
        assert_eq!(config.batch.flush_interval_ms, 200);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[broker]\nurl = \"ws://localhost:9999/ws\"").unwrap();

        let config = ClientConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.resolve_broker_url().unwrap(), "ws://localhost:9999/ws");
    }

    #[test]
    fn test_validate_rejects_zero_initial_delay() {
        let mut config = ClientConfig::default();
        config.backoff.initial_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_max_below_initial() {
        let mut config = ClientConfig::default();
        config.backoff.initial_delay_ms = 5000;
        config.backoff.max_delay_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_multiplier_below_one() {
        let mut config = ClientConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_jitter() {
        let mut config = ClientConfig::default();
        config.backoff.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_prefers_explicit_url() {
        let mut config = ClientConfig::default();
        config.broker.url = Some("wss://broker.example.com/ws".to_string());
        config.broker.page_origin = Some("https://other.example.com".to_string());
        assert_eq!(
            config.resolve_broker_url().unwrap(),
            "wss://broker.example.com/ws"
        );
    }

    #[test]
    fn test_resolve_rejects_non_ws_scheme() {
        let mut config = ClientConfig::default();
        config.broker.url = Some("https://broker.example.com/ws".to_string());
        assert!(matches!(
            config.resolve_broker_url(),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_derive_ws_url_scheme_mapping() {
        assert_eq!(
            derive_ws_url("https://prayer.example.com").unwrap(),
            "wss://prayer.example.com/ws"
        );
        assert_eq!(
            derive_ws_url("http://localhost:8080").unwrap(),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn test_derive_ws_url_rejects_other_schemes() {
        assert!(derive_ws_url("ftp://example.com").is_err());
        assert!(derive_ws_url("not a url").is_err());
    }
}
