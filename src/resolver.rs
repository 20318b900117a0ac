//! Logical-to-concrete path resolution
//!
//! Maps a `(bucket, filename)` pair to its locations on the primary and
//! mirror volumes. Pure: no I/O, no side effects. Filenames are opaque
//! tokens; anything that could escape the bucket root is rejected rather
//! than normalized.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};

/// Concrete locations for one logical file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub primary: PathBuf,
    pub mirror: PathBuf,
}

/// Reject filenames that could resolve outside the bucket root
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(VaultError::InvalidFilename("empty filename".to_string()));
    }

    if filename.contains(['/', '\\', '\0']) {
        return Err(VaultError::InvalidFilename(format!(
            "path separator in filename: {filename:?}"
        )));
    }

    // "." and ".." are directory references, not filenames
    if filename == "." || filename == ".." {
        return Err(VaultError::InvalidFilename(format!(
            "traversal sequence: {filename:?}"
        )));
    }

    Ok(())
}

/// Stateless resolver over the configured bucket set
#[derive(Debug, Clone)]
pub struct PathResolver {
    config: Arc<VaultConfig>,
}

impl PathResolver {
    pub fn new(config: Arc<VaultConfig>) -> Self {
        Self { config }
    }

    /// Configured bucket names, in configuration order
    pub fn buckets(&self) -> &[String] {
        &self.config.buckets
    }

    /// Check that `bucket` is in the configured enumerated set
    pub fn validate_bucket(&self, bucket: &str) -> Result<()> {
        if self.config.buckets.iter().any(|b| b == bucket) {
            Ok(())
        } else {
            Err(VaultError::InvalidBucket(bucket.to_string()))
        }
    }

    /// Primary directory for a bucket
    pub fn primary_dir(&self, bucket: &str) -> Result<PathBuf> {
        self.validate_bucket(bucket)?;
        Ok(self.config.primary_root.join(bucket))
    }

    /// Mirror directory for a bucket
    pub fn mirror_dir(&self, bucket: &str) -> Result<PathBuf> {
        self.validate_bucket(bucket)?;
        Ok(self.config.mirror_root.join(bucket))
    }

    /// Resolve a logical file to its concrete primary and mirror paths
    pub fn resolve(&self, bucket: &str, filename: &str) -> Result<ResolvedPaths> {
        self.validate_bucket(bucket)?;
        validate_filename(filename)?;

        Ok(ResolvedPaths {
            primary: self.config.primary_root.join(bucket).join(filename),
            mirror: self.config.mirror_root.join(bucket).join(filename),
        })
    }
}
