//! Shared statistics registry
//!
//! Cloneable handle over process-wide counters, a bounded ring of recent
//! restore events, and the known-file registry used for hard-loss detection.
//! Mutated by the reconciliation scheduler and the change watcher, read by
//! the health endpoint.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::types::{CopyDirection, ResilienceStats, RestoreEvent};

/// Retained restore events for diagnostics
const EVENT_RING_CAPACITY: usize = 256;

#[derive(Default)]
struct StatsInner {
    stats: ResilienceStats,
    recent_events: VecDeque<RestoreEvent>,
    /// Every filename observed on either tier in any sweep, per bucket.
    /// A remembered file later absent from both tiers is a hard loss.
    known_files: HashMap<String, BTreeSet<String>>,
    /// Files currently flagged as lost from both tiers
    hard_losses: BTreeSet<String>,
    watcher_active: bool,
}

/// Cloneable registry handle
#[derive(Clone, Default)]
pub struct StatsRegistry {
    inner: Arc<RwLock<StatsInner>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed copy and its event
    pub fn record_event(&self, event: RestoreEvent) {
        let mut inner = self.inner.write();
        if event.is_success() {
            match event.direction {
                CopyDirection::Restore => {
                    inner.stats.total_restored += 1;
                    inner.stats.last_restore_time = Some(event.timestamp);
                }
                CopyDirection::Backup => {
                    inner.stats.total_backed_up += 1;
                }
            }
            // A successful copy means the file exists on both tiers again
            let key = format!("{}/{}", event.bucket, event.filename);
            inner.hard_losses.remove(&key);
        } else {
            inner.stats.total_failed += 1;
        }

        if inner.recent_events.len() == EVENT_RING_CAPACITY {
            inner.recent_events.pop_front();
        }
        inner.recent_events.push_back(event);
    }

    /// Record the completion of one reconciliation sweep
    pub fn record_sweep(&self) {
        let mut inner = self.inner.write();
        inner.stats.sweep_cycles += 1;
        inner.stats.last_sweep_time = Some(Utc::now());
    }

    /// Remember files observed on either tier during a scan, and flag any
    /// previously-known file now absent from both tiers as a hard loss.
    /// Returns the newly detected hard losses as `bucket/filename` keys.
    pub fn observe_bucket(
        &self,
        bucket: &str,
        present_anywhere: impl IntoIterator<Item = String>,
    ) -> Vec<String> {
        let current: BTreeSet<String> = present_anywhere.into_iter().collect();
        let mut inner = self.inner.write();

        let known = inner.known_files.entry(bucket.to_string()).or_default();
        let lost: Vec<String> = known
            .iter()
            .filter(|f| !current.contains(*f))
            .map(|f| format!("{bucket}/{f}"))
            .collect();
        known.extend(current);

        let mut newly_lost = Vec::new();
        for key in lost {
            if inner.hard_losses.insert(key.clone()) {
                newly_lost.push(key);
            }
        }
        newly_lost
    }

    pub fn set_watcher_active(&self, active: bool) {
        self.inner.write().watcher_active = active;
    }

    pub fn watcher_active(&self) -> bool {
        self.inner.read().watcher_active
    }

    pub fn snapshot(&self) -> ResilienceStats {
        self.inner.read().stats.clone()
    }

    pub fn hard_losses(&self) -> Vec<String> {
        self.inner.read().hard_losses.iter().cloned().collect()
    }

    pub fn recent_events(&self) -> Vec<RestoreEvent> {
        self.inner.read().recent_events.iter().cloned().collect()
    }
}
