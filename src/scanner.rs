//! Integrity scanner: per-bucket divergence detection
//!
//! Lists primary and mirror contents for a bucket (non-recursive; each
//! bucket is a flat namespace) and computes the set difference in both
//! directions. A missing directory reads as an empty listing, not an error:
//! an entirely lost bucket surfaces as everything missing on that side.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::Result;
use crate::resolver::PathResolver;

/// Divergence between the two tiers for one bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketDiff {
    pub bucket: String,
    /// On primary, absent from mirror: newly uploaded, needs backup
    pub missing_in_mirror: Vec<String>,
    /// On mirror, absent from primary: lost from primary, needs restore
    pub missing_in_primary: Vec<String>,
    pub primary_count: usize,
    pub mirror_count: usize,
}

impl BucketDiff {
    pub fn is_converged(&self) -> bool {
        self.missing_in_mirror.is_empty() && self.missing_in_primary.is_empty()
    }
}

/// Non-recursive listing of regular files. A missing directory is an empty
/// listing, as is a bucket path occupied by a non-directory; both are
/// divergence evidence, not scan errors.
pub async fn list_files(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
            ) =>
        {
            return Ok(names)
        }
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => {
                // Paths are resolved by UTF-8 names; this file stays
                // invisible to reconciliation until renamed
                tracing::warn!(
                    "Skipping non-UTF-8 name {:?} in {}",
                    raw,
                    dir.display()
                );
            }
        }
    }

    Ok(names)
}

/// Scans buckets for primary/mirror divergence
#[derive(Debug, Clone)]
pub struct IntegrityScanner {
    resolver: PathResolver,
}

/// Full scan result: the diff plus the raw union, needed by hard-loss tracking
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub diff: BucketDiff,
    /// Every filename present on at least one tier
    pub all_files: BTreeSet<String>,
}

impl IntegrityScanner {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Configured bucket names
    pub fn buckets(&self) -> &[String] {
        self.resolver.buckets()
    }

    /// Scan one bucket. Directory state is re-read fresh on every call;
    /// there is deliberately no cached listing.
    pub async fn scan(&self, bucket: &str) -> Result<ScanResult> {
        let primary_dir = self.resolver.primary_dir(bucket)?;
        let mirror_dir = self.resolver.mirror_dir(bucket)?;

        let primary = list_files(&primary_dir).await?;
        let mirror = list_files(&mirror_dir).await?;

        let missing_in_mirror: Vec<String> =
            primary.difference(&mirror).cloned().collect();
        let missing_in_primary: Vec<String> =
            mirror.difference(&primary).cloned().collect();

        let diff = BucketDiff {
            bucket: bucket.to_string(),
            missing_in_mirror,
            missing_in_primary,
            primary_count: primary.len(),
            mirror_count: mirror.len(),
        };

        let all_files: BTreeSet<String> = primary.union(&mirror).cloned().collect();

        Ok(ScanResult { diff, all_files })
    }
}
