//! Configuration for the ESI fragment core

use crate::error::{EsiError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for scanning and querying one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiConfig {
    /// Read chunk size for the streaming scanner in bytes (default: 4KB)
    #[serde(default = "default_scan_buffer_size")]
    pub scan_buffer_size: usize,

    /// Upper bound for a single tag body in bytes (default: 16KB).
    /// An opening whose terminator has not appeared within this many bytes
    /// is discarded as malformed.
    #[serde(default = "default_max_tag_size")]
    pub max_tag_size: usize,

    /// Per-entity fetch timeout in milliseconds, used when a tag carries no
    /// timeout attribute (default: 30000)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Fallback content substituted when all resources of an entity fail
    /// and the tag carries no onerror attribute (default: none)
    #[serde(default)]
    pub default_on_error: Option<String>,

    /// Maximum number of entities fetched concurrently per page (default: 32)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,
}

// Default value functions for serde
fn default_scan_buffer_size() -> usize {
    4 * 1024
}

fn default_max_tag_size() -> usize {
    16 * 1024
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent() -> usize {
    32
}

impl Default for EsiConfig {
    fn default() -> Self {
        EsiConfig {
            scan_buffer_size: default_scan_buffer_size(),
            max_tag_size: default_max_tag_size(),
            default_timeout_ms: default_timeout_ms(),
            default_on_error: None,
            max_concurrent_fetches: default_max_concurrent(),
        }
    }
}

impl EsiConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| EsiError::Config(format!("Failed to read config file: {}", e)))?;

        let config: EsiConfig = serde_yaml::from_str(&content)
            .map_err(|e| EsiError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - scan_buffer_size must be between 512 bytes and 1MB
    /// - max_tag_size must be at least 64 bytes
    /// - default_timeout_ms must be greater than 0
    /// - max_concurrent_fetches must be greater than 0
    pub fn validate(&self) -> Result<()> {
        const MIN_BUFFER_SIZE: usize = 512;
        const MAX_BUFFER_SIZE: usize = 1024 * 1024;
        const MIN_TAG_SIZE: usize = 64;

        if self.scan_buffer_size < MIN_BUFFER_SIZE || self.scan_buffer_size > MAX_BUFFER_SIZE {
            return Err(EsiError::Config(format!(
                "scan_buffer_size must be between {} bytes and {}KB, got {} bytes",
                MIN_BUFFER_SIZE,
                MAX_BUFFER_SIZE / 1024,
                self.scan_buffer_size
            )));
        }

        if self.max_tag_size < MIN_TAG_SIZE {
            return Err(EsiError::Config(format!(
                "max_tag_size must be at least {} bytes, got {}",
                MIN_TAG_SIZE, self.max_tag_size
            )));
        }

        if self.default_timeout_ms == 0 {
            return Err(EsiError::Config(
                "default_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_fetches == 0 {
            return Err(EsiError::Config(
                "max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The fallback per-entity timeout as a `Duration`.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EsiConfig::default();
        assert_eq!(config.scan_buffer_size, 4 * 1024);
        assert_eq!(config.max_tag_size, 16 * 1024);
        assert_eq!(config.default_timeout_ms, 30_000);
        assert_eq!(config.max_concurrent_fetches, 32);
        assert!(config.default_on_error.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(EsiConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_buffer_too_small() {
        let mut config = EsiConfig::default();
        config.scan_buffer_size = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_tag_size_too_small() {
        let mut config = EsiConfig::default();
        config.max_tag_size = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = EsiConfig::default();
        config.default_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = EsiConfig::default();
        config.max_concurrent_fetches = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = "scan_buffer_size: 8192\nmax_tag_size: 4096\ndefault_timeout_ms: 250\n";
        let config: EsiConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scan_buffer_size, 8192);
        assert_eq!(config.max_tag_size, 4096);
        assert_eq!(config.default_timeout(), Duration::from_millis(250));
        // unset fields fall back to defaults
        assert_eq!(config.max_concurrent_fetches, 32);
    }
}
