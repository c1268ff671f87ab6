//! Peer configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default delay before re-evaluating after a failed generation declaration
const DEFAULT_TAKEOVER_BACKOFF_MS: u64 = 1000;

/// Default delay before retrying a failed database reconfiguration
const DEFAULT_APPLY_RETRY_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Static configuration of one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerConfig {
    /// Run as a single-node cluster with no synchronous replica
    pub singleton: bool,
    pub takeover_backoff_ms: u64,
    pub apply_retry_ms: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            singleton: false,
            takeover_backoff_ms: DEFAULT_TAKEOVER_BACKOFF_MS,
            apply_retry_ms: DEFAULT_APPLY_RETRY_MS,
        }
    }
}

impl PeerConfig {
    pub fn singleton() -> Self {
        Self::default().with_singleton(true)
    }

    pub fn with_singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    pub fn with_takeover_backoff(mut self, backoff: Duration) -> Self {
        self.takeover_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_apply_retry(mut self, interval: Duration) -> Self {
        self.apply_retry_ms = interval.as_millis() as u64;
        self
    }

    pub fn takeover_backoff(&self) -> Duration {
        Duration::from_millis(self.takeover_backoff_ms)
    }

    pub fn apply_retry_interval(&self) -> Duration {
        Duration::from_millis(self.apply_retry_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.takeover_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "takeoverBackoffMs must be greater than 0".to_string(),
            ));
        }
        if self.apply_retry_ms == 0 {
            return Err(ConfigError::Invalid(
                "applyRetryMs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeerConfig::default();
        assert!(!config.singleton);
        assert_eq!(config.takeover_backoff(), Duration::from_secs(1));
        assert_eq!(config.apply_retry_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = PeerConfig::from_json(r#"{ "singleton": true }"#).unwrap();
        assert!(config.singleton);
        assert_eq!(config.apply_retry_ms, DEFAULT_APPLY_RETRY_MS);
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let config = PeerConfig::default().with_takeover_backoff(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(PeerConfig::from_json(r#"{ "applyRetryMs": 0 }"#).is_err());
        assert!(matches!(
            PeerConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
