//! Core domain types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a copy between the two tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyDirection {
    /// primary -> mirror (a newly uploaded file being backed up)
    Backup,
    /// mirror -> primary (a lost file being recovered)
    Restore,
}

/// What initiated a restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreTrigger {
    /// Scheduled reconciliation sweep
    Sweep,
    /// Real-time filesystem change notification
    Watch,
}

/// Outcome of one copy attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RestoreOutcome {
    Success { bytes: u64 },
    Failed { reason: String },
}

/// Immutable record of one backup/restore action. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreEvent {
    pub bucket: String,
    pub filename: String,
    pub direction: CopyDirection,
    pub trigger: RestoreTrigger,
    pub timestamp: DateTime<Utc>,
    pub outcome: RestoreOutcome,
}

impl RestoreEvent {
    pub fn success(
        bucket: &str,
        filename: &str,
        direction: CopyDirection,
        trigger: RestoreTrigger,
        bytes: u64,
    ) -> Self {
        Self {
            bucket: bucket.to_string(),
            filename: filename.to_string(),
            direction,
            trigger,
            timestamp: Utc::now(),
            outcome: RestoreOutcome::Success { bytes },
        }
    }

    pub fn failed(
        bucket: &str,
        filename: &str,
        direction: CopyDirection,
        trigger: RestoreTrigger,
        reason: String,
    ) -> Self {
        Self {
            bucket: bucket.to_string(),
            filename: filename.to_string(),
            direction,
            trigger,
            timestamp: Utc::now(),
            outcome: RestoreOutcome::Failed { reason },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RestoreOutcome::Success { .. })
    }
}

/// Synchronization state of one logical file across the two tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Present on both tiers
    Synchronized,
    /// Present only on primary; not yet backed up
    PrimaryOrphaned,
    /// Present only on mirror; lost from primary
    MirrorOnly,
}

/// Observed state of one logical file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub bucket: String,
    pub filename: String,
    pub on_primary: bool,
    pub on_mirror: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// Derived sync state; `None` means absent from both tiers (hard loss)
    pub fn sync_state(&self) -> Option<SyncState> {
        match (self.on_primary, self.on_mirror) {
            (true, true) => Some(SyncState::Synchronized),
            (true, false) => Some(SyncState::PrimaryOrphaned),
            (false, true) => Some(SyncState::MirrorOnly),
            (false, false) => None,
        }
    }
}

/// Process-wide counters. Created at startup, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceStats {
    /// Files restored mirror -> primary since process start
    pub total_restored: u64,
    /// Files backed up primary -> mirror since process start
    pub total_backed_up: u64,
    /// Copy attempts that failed (retried on a later sweep)
    pub total_failed: u64,
    /// Completed reconciliation sweeps
    pub sweep_cycles: u64,
    pub last_sweep_time: Option<DateTime<Utc>>,
    pub last_restore_time: Option<DateTime<Utc>>,
}

/// Delta produced by one reconciliation sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub buckets_scanned: usize,
    pub files_backed_up: u64,
    pub files_restored: u64,
    pub files_failed: u64,
    /// Files discovered absent from both tiers during this sweep
    pub hard_losses: Vec<String>,
}

/// Health/diagnostics payload for the operational dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether the change watcher is delivering real-time notifications
    pub is_monitoring: bool,
    pub last_sweep_time: Option<DateTime<Utc>>,
    pub last_restore_time: Option<DateTime<Utc>>,
    pub total_restored: u64,
    pub sweep_cycles: u64,
    /// Per-bucket count of files present on primary
    pub per_bucket_file_counts: BTreeMap<String, usize>,
    /// Files currently present on exactly one tier
    pub missing_file_count: usize,
    /// Files absent from both tiers; unrecoverable by this subsystem
    pub hard_loss_count: usize,
    pub hard_losses: Vec<String>,
}
