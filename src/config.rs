//! Runtime configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file
//! (or none at all) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardiolinkConfig {
    pub gateway: GatewayConfig,
    pub monitor: MonitorConfig,
}

/// Health gateway behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Reject HRV computation when the window holds fewer samples per
    /// minute than this. `None` keeps the lenient behavior.
    pub min_samples_per_minute: Option<f64>,
}

/// Monitor (presentation adapter) behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Window used by `refresh_all`.
    pub default_hours_back: u32,
    /// Cap on the published sample list while live monitoring appends to it.
    pub max_recent_samples: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_hours_back: 24,
            max_recent_samples: 4096,
        }
    }
}

impl CardiolinkConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        let config: CardiolinkConfig = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate) = self.gateway.min_samples_per_minute {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "min_samples_per_minute must be positive, got {}",
                    rate
                )));
            }
        }
        if self.monitor.default_hours_back == 0 {
            return Err(ConfigError::Invalid("default_hours_back must be at least 1".into()));
        }
        if self.monitor.max_recent_samples == 0 {
            return Err(ConfigError::Invalid("max_recent_samples must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_lenient() {
        let config = CardiolinkConfig::default();
        assert_eq!(config.gateway.min_samples_per_minute, None);
        assert_eq!(config.monitor.default_hours_back, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardiolink.json");
        std::fs::write(&path, r#"{ "gateway": { "min_samples_per_minute": 2.5 } }"#).unwrap();

        let config = CardiolinkConfig::load(&path).unwrap();
        assert_eq!(config.gateway.min_samples_per_minute, Some(2.5));
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardiolink.json");
        let mut config = CardiolinkConfig::default();
        config.monitor.default_hours_back = 6;
        config.save(&path).unwrap();
        assert_eq!(CardiolinkConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_zero_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardiolink.json");
        std::fs::write(&path, r#"{ "monitor": { "default_hours_back": 0 } }"#).unwrap();
        assert!(matches!(
            CardiolinkConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardiolink.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(CardiolinkConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
