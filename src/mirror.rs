//! Mirror writer: idempotent whole-file copies between tiers
//!
//! Copies are whole-file with a write-then-verify completion check (byte
//! length, no content hashing). Re-copying an unchanged source is safe and
//! yields identical destination content, which is what makes duplicate
//! in-flight restores from the scheduler and the watcher harmless.

use std::path::Path;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{Result, VaultError};

/// Report of one completed copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    pub bytes: u64,
}

/// Performs primary<->mirror copies with a bounded per-copy timeout
#[derive(Debug, Clone)]
pub struct MirrorWriter {
    copy_timeout: Duration,
}

impl MirrorWriter {
    pub fn new(copy_timeout: Duration) -> Self {
        Self { copy_timeout }
    }

    /// Copy `source` to `destination`, creating the destination's parent
    /// directory if absent. Verifies the destination byte length matches
    /// the source on completion.
    ///
    /// Errors: `SourceMissing` if the source vanished between detection and
    /// copy (benign race), `WriteFailed` for disk/permission/timeout
    /// failures (retried by the next sweep, never inline).
    pub async fn copy(&self, source: &Path, destination: &Path) -> Result<CopyReport> {
        let source_meta = match tokio::fs::metadata(source).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::SourceMissing(source.to_path_buf()));
            }
            Err(e) => {
                return Err(VaultError::WriteFailed(format!(
                    "failed to stat {}: {e}",
                    source.display()
                )));
            }
        };

        if !source_meta.is_file() {
            return Err(VaultError::WriteFailed(format!(
                "source is not a regular file: {}",
                source.display()
            )));
        }

        // create_dir_all is idempotent; already-exists is success
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VaultError::WriteFailed(format!(
                    "failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let copied = match timeout(self.copy_timeout, tokio::fs::copy(source, destination)).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::SourceMissing(source.to_path_buf()));
            }
            Ok(Err(e)) => {
                return Err(VaultError::WriteFailed(format!(
                    "copy {} -> {}: {e}",
                    source.display(),
                    destination.display()
                )));
            }
            Err(_) => {
                return Err(VaultError::WriteFailed(format!(
                    "copy {} -> {} timed out after {:?}",
                    source.display(),
                    destination.display(),
                    self.copy_timeout
                )));
            }
        };

        // Write-then-verify: a partial write must not pass as complete
        let dest_meta = tokio::fs::metadata(destination).await.map_err(|e| {
            VaultError::WriteFailed(format!(
                "failed to verify {}: {e}",
                destination.display()
            ))
        })?;

        if dest_meta.len() != source_meta.len() {
            return Err(VaultError::WriteFailed(format!(
                "length mismatch for {}: wrote {} of {} bytes",
                destination.display(),
                dest_meta.len(),
                source_meta.len()
            )));
        }

        Ok(CopyReport { bytes: copied })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn writer() -> MirrorWriter {
        MirrorWriter::new(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_copy_creates_parent_and_matches_length() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.jpg");
        let dest = dir.path().join("mirror").join("avatars").join("src.jpg");
        tokio::fs::write(&source, b"image bytes").await.unwrap();

        let report = writer().copy(&source, &dest).await.unwrap();
        assert_eq!(report.bytes, 11);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"image bytes");
    }

    #[tokio::test]
    async fn test_copy_is_idempotent() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.png");
        let dest = dir.path().join("b.png");
        tokio::fs::write(&source, b"stable content").await.unwrap();

        let w = writer();
        w.copy(&source, &dest).await.unwrap();
        let first = tokio::fs::read(&dest).await.unwrap();
        w.copy(&source, &dest).await.unwrap();
        let second = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_copy_overwrites_partial_destination() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("full.mp4");
        let dest = dir.path().join("partial.mp4");
        tokio::fs::write(&source, b"complete file body").await.unwrap();
        tokio::fs::write(&dest, b"trunc").await.unwrap();

        writer().copy(&source, &dest).await.unwrap();
        assert_eq!(
            tokio::fs::read(&dest).await.unwrap(),
            b"complete file body"
        );
    }

    #[tokio::test]
    async fn test_missing_source_is_source_missing() {
        let dir = tempdir().unwrap();
        let err = writer()
            .copy(&dir.path().join("gone.jpg"), &dir.path().join("out.jpg"))
            .await
            .unwrap_err();
        assert!(err.is_benign());
        assert!(matches!(err, VaultError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn test_timed_out_copy_is_write_failed() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("big.mp4");
        let dest = dir.path().join("out.mp4");
        tokio::fs::write(&source, vec![0u8; 1 << 20]).await.unwrap();

        let err = MirrorWriter::new(Duration::from_nanos(1))
            .copy(&source, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::WriteFailed(_)));
        assert!(err.is_retryable());
        assert!(!err.is_benign());
    }

    #[tokio::test]
    async fn test_directory_source_is_write_failed() {
        let dir = tempdir().unwrap();
        let subdir = dir.path().join("sub");
        tokio::fs::create_dir(&subdir).await.unwrap();

        let err = writer()
            .copy(&subdir, &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::WriteFailed(_)));
        assert!(err.is_retryable());
    }
}
