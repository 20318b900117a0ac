//! Tiered read fallback
//!
//! Resolves an inbound read to the first tier that holds the file, in
//! strict primary-then-mirror order, carrying provenance so a caller can
//! tell degraded service from normal service. Absence from every tier is a
//! structured not-found outcome, never a bare miss.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::resolver::PathResolver;

/// Storage tier that satisfied (or could satisfy) a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeTier {
    Primary,
    Mirror,
}

impl ServeTier {
    /// Lookup order: primary first, mirror only as fallback
    pub const ORDER: [ServeTier; 2] = [ServeTier::Primary, ServeTier::Mirror];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServeTier::Primary => "primary",
            ServeTier::Mirror => "mirror",
        }
    }
}

/// A located file, ready to stream
#[derive(Debug, Clone)]
pub struct ServedFile {
    pub path: PathBuf,
    pub tier: ServeTier,
    pub size: u64,
}

/// Diagnostic payload for a file absent from every tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotFoundPayload {
    pub bucket: String,
    pub filename: String,
    pub attempted_paths: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Request-scoped resolver walking the tier order
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    resolver: PathResolver,
}

impl FallbackResolver {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Locate `(bucket, filename)` on the first tier holding it.
    ///
    /// Errors: `InvalidBucket`/`InvalidFilename` fail fast before any I/O;
    /// `NotFound` carries both attempted paths and a timestamp.
    pub async fn locate(&self, bucket: &str, filename: &str) -> Result<ServedFile> {
        let paths = self.resolver.resolve(bucket, filename)?;

        let mut attempted = Vec::with_capacity(ServeTier::ORDER.len());
        for tier in ServeTier::ORDER {
            let path = match tier {
                ServeTier::Primary => &paths.primary,
                ServeTier::Mirror => &paths.mirror,
            };
            attempted.push(path.display().to_string());

            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.is_file() => {
                    if tier == ServeTier::Mirror {
                        tracing::warn!(
                            "Serving {bucket}/{filename} from mirror; primary copy missing"
                        );
                    }
                    return Ok(ServedFile {
                        path: path.clone(),
                        tier,
                        size: meta.len(),
                    });
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    // Tier exists but is unreadable: a race/corruption class,
                    // not absence
                    return Err(VaultError::StreamError(format!(
                        "cannot read {}: {e}",
                        path.display()
                    )));
                }
            }
        }

        Err(VaultError::NotFound(Box::new(NotFoundPayload {
            bucket: bucket.to_string(),
            filename: filename.to_string(),
            attempted_paths: attempted,
            timestamp: Utc::now(),
        })))
    }

    /// Open a located file for streaming. An open failure after a passed
    /// existence check is a `StreamError`, never `NotFound`.
    pub async fn open(&self, served: &ServedFile) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&served.path).await.map_err(|e| {
            VaultError::StreamError(format!("cannot open {}: {e}", served.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;
    use crate::config::VaultConfig;

    async fn setup(dir: &tempfile::TempDir) -> FallbackResolver {
        let config = VaultConfig::new(dir.path().join("primary"), dir.path().join("mirror"));
        FallbackResolver::new(PathResolver::new(Arc::new(config)))
    }

    async fn put(dir: &tempfile::TempDir, tier: &str, bucket: &str, name: &str, body: &[u8]) {
        let path = dir.path().join(tier).join(bucket);
        tokio::fs::create_dir_all(&path).await.unwrap();
        tokio::fs::write(path.join(name), body).await.unwrap();
    }

    #[tokio::test]
    async fn test_primary_wins_over_divergent_mirror() {
        let dir = tempdir().unwrap();
        let fallback = setup(&dir).await;
        put(&dir, "primary", "avatars", "u1.jpg", b"primary content").await;
        put(&dir, "mirror", "avatars", "u1.jpg", b"stale mirror!!!").await;

        let served = fallback.locate("avatars", "u1.jpg").await.unwrap();
        assert_eq!(served.tier, ServeTier::Primary);
        assert_eq!(
            tokio::fs::read(&served.path).await.unwrap(),
            b"primary content"
        );
    }

    #[tokio::test]
    async fn test_mirror_fallback_carries_provenance() {
        let dir = tempdir().unwrap();
        let fallback = setup(&dir).await;
        put(&dir, "mirror", "gallery", "g1.png", b"only on mirror").await;

        let served = fallback.locate("gallery", "g1.png").await.unwrap();
        assert_eq!(served.tier, ServeTier::Mirror);
        assert_eq!(served.size, 14);
    }

    #[tokio::test]
    async fn test_not_found_names_both_attempted_paths() {
        let dir = tempdir().unwrap();
        let fallback = setup(&dir).await;

        let err = fallback.locate("videos", "missing.mp4").await.unwrap_err();
        let VaultError::NotFound(payload) = err else {
            panic!("expected NotFound, got {err:?}");
        };
        assert_eq!(payload.bucket, "videos");
        assert_eq!(payload.filename, "missing.mp4");
        assert_eq!(payload.attempted_paths.len(), 2);
        assert!(payload.attempted_paths[0].contains("primary"));
        assert!(payload.attempted_paths[1].contains("mirror"));
    }

    #[tokio::test]
    async fn test_invalid_input_fails_before_io() {
        let dir = tempdir().unwrap();
        let fallback = setup(&dir).await;

        assert!(matches!(
            fallback.locate("unknown", "a.jpg").await.unwrap_err(),
            VaultError::InvalidBucket(_)
        ));
        assert!(matches!(
            fallback.locate("avatars", "../../etc/passwd").await.unwrap_err(),
            VaultError::InvalidFilename(_)
        ));
    }

    #[tokio::test]
    async fn test_unreadable_tier_is_stream_error() {
        // A regular file squatting on the bucket path makes the lookup
        // fail with something other than absence; that is corruption
        // class, not a miss, even though the mirror holds the file
        let dir = tempdir().unwrap();
        let fallback = setup(&dir).await;
        put(&dir, "mirror", "avatars", "u1.jpg", b"recoverable").await;
        tokio::fs::create_dir_all(dir.path().join("primary")).await.unwrap();
        tokio::fs::write(dir.path().join("primary/avatars"), b"squatter")
            .await
            .unwrap();

        let err = fallback.locate("avatars", "u1.jpg").await.unwrap_err();
        assert!(matches!(err, VaultError::StreamError(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_open_failure_after_locate_is_stream_error_not_not_found() {
        let dir = tempdir().unwrap();
        let fallback = setup(&dir).await;
        put(&dir, "primary", "gallery", "g1.png", b"fleeting").await;

        let served = fallback.locate("gallery", "g1.png").await.unwrap();
        tokio::fs::remove_file(&served.path).await.unwrap();

        let err = fallback.open(&served).await.unwrap_err();
        assert!(matches!(err, VaultError::StreamError(_)));
    }

    #[tokio::test]
    async fn test_directory_entry_is_not_served() {
        let dir = tempdir().unwrap();
        let fallback = setup(&dir).await;
        tokio::fs::create_dir_all(dir.path().join("primary/avatars/odd"))
            .await
            .unwrap();

        let err = fallback.locate("avatars", "odd").await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }
}
