//! Vault configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VaultError};

/// Default bucket set for the marketplace media layout
pub const DEFAULT_BUCKETS: &[&str] = &["avatars", "gallery", "videos", "documents"];

/// Configuration for the resilience layer
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Root directory of the ephemeral primary volume
    pub primary_root: PathBuf,
    /// Root directory of the durable mirror volume
    pub mirror_root: PathBuf,
    /// Enumerated bucket names; each maps to one directory under each root
    #[serde(default = "default_buckets")]
    pub buckets: Vec<String>,
    /// Period between reconciliation sweeps
    #[serde(default = "default_sweep_interval", with = "duration_secs")]
    pub sweep_interval: Duration,
    /// Maximum concurrent copy operations within one sweep
    #[serde(default = "default_copy_concurrency")]
    pub copy_concurrency: usize,
    /// Per-copy timeout; a timed-out copy is retried on the next sweep
    #[serde(default = "default_copy_timeout", with = "duration_secs")]
    pub copy_timeout: Duration,
}

fn default_buckets() -> Vec<String> {
    DEFAULT_BUCKETS.iter().map(|s| s.to_string()).collect()
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_copy_concurrency() -> usize {
    8
}

fn default_copy_timeout() -> Duration {
    Duration::from_secs(20)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl VaultConfig {
    /// Create a config with recommended defaults for the given roots
    pub fn new(primary_root: impl Into<PathBuf>, mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            primary_root: primary_root.into(),
            mirror_root: mirror_root.into(),
            buckets: default_buckets(),
            sweep_interval: default_sweep_interval(),
            copy_concurrency: default_copy_concurrency(),
            copy_timeout: default_copy_timeout(),
        }
    }

    /// Fail fast on configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(VaultError::Config(
                "at least one bucket must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for bucket in &self.buckets {
            if bucket.is_empty() || bucket.contains(['/', '\\']) {
                return Err(VaultError::Config(format!(
                    "invalid bucket name: {bucket:?}"
                )));
            }
            if !seen.insert(bucket.as_str()) {
                return Err(VaultError::Config(format!("duplicate bucket: {bucket}")));
            }
        }

        if self.primary_root == self.mirror_root {
            return Err(VaultError::Config(
                "primary and mirror roots must be distinct".to_string(),
            ));
        }

        if self.copy_concurrency == 0 {
            return Err(VaultError::Config(
                "copy_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VaultConfig::new("/data/primary", "/data/mirror");
        assert!(config.validate().is_ok());
        assert_eq!(config.buckets.len(), 4);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_identical_roots_rejected() {
        let config = VaultConfig::new("/data/files", "/data/files");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_buckets_rejected() {
        let mut config = VaultConfig::new("/p", "/m");
        config.buckets = vec!["avatars".to_string(), "avatars".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = VaultConfig::new("/p", "/m");
        config.copy_concurrency = 0;
        assert!(config.validate().is_err());
    }
}
