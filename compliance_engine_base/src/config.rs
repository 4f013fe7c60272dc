// src/config.rs
//! Engine configuration
//!
//! Values come from a TOML file when one is given; anything missing falls
//! back to the environment (`COMPLIANCE_*`) and then to built-in defaults.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PACKAGE_CACHE_PATH: &str = "/var/lib/compliance-engine/packagecache";
pub const DEFAULT_PACKAGE_LIST_TTL_SECS: u64 = 3000;
pub const DEFAULT_PACKAGE_LIST_STALE_TTL_SECS: u64 = 12600;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the package list cache is persisted
    pub package_cache_path: PathBuf,

    /// Cache age (seconds) after which a refresh is attempted
    pub package_list_ttl_secs: u64,

    /// Cache age (seconds) after which the cache is no longer served at all
    pub package_list_stale_ttl_secs: u64,

    /// Upper bound for a single external command
    pub command_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            package_cache_path: env::var("COMPLIANCE_PACKAGE_CACHE_PATH")
                .ok()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PACKAGE_CACHE_PATH)),
            package_list_ttl_secs: env::var("COMPLIANCE_PACKAGE_LIST_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PACKAGE_LIST_TTL_SECS),
            package_list_stale_ttl_secs: env::var("COMPLIANCE_PACKAGE_LIST_STALE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PACKAGE_LIST_STALE_TTL_SECS),
            command_timeout_secs: env::var("COMPLIANCE_COMMAND_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<string>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.package_list_stale_ttl_secs <= self.package_list_ttl_secs {
            return Err(Error::invalid(format!(
                "package_list_stale_ttl_secs ({}) must be greater than package_list_ttl_secs ({})",
                self.package_list_stale_ttl_secs, self.package_list_ttl_secs
            )));
        }
        if self.command_timeout_secs == 0 {
            return Err(Error::invalid("command_timeout_secs must be non-zero"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn with_package_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_cache_path = path.into();
        self
    }

    pub fn with_package_list_ttls(mut self, ttl_secs: u64, stale_ttl_secs: u64) -> Self {
        self.package_list_ttl_secs = ttl_secs;
        self.package_list_stale_ttl_secs = stale_ttl_secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("command_timeout_secs = 10\n").unwrap();
        assert_eq!(config.command_timeout_secs, 10);
        assert!(config.package_list_stale_ttl_secs > config.package_list_ttl_secs);
    }

    #[test]
    fn test_stale_ttl_must_exceed_ttl() {
        let result = EngineConfig::from_toml_str(
            "package_list_ttl_secs = 100\npackage_list_stale_ttl_secs = 50\n",
        );
        match result {
            Err(ConfigError::Invalid(e)) => assert!(e.message.contains("must be greater")),
            other => panic!("Expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_reported() {
        match EngineConfig::from_toml_str("command_timeout_secs = \"soon\"") {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_helpers() {
        let config = EngineConfig::default()
            .with_package_cache_path("/tmp/cache")
            .with_package_list_ttls(10, 20);
        assert_eq!(config.package_cache_path, PathBuf::from("/tmp/cache"));
        assert!(config.validate().is_ok());
        assert_eq!(config.command_timeout(), Duration::from_secs(config.command_timeout_secs));
    }
}
