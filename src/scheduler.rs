//! Reconciliation scheduler
//!
//! Long-lived worker looping Idle -> Scanning -> Restoring -> Idle on a
//! fixed period. Each cycle scans every configured bucket, backs up files
//! missing from the mirror, restores files missing from primary, and folds
//! per-file outcomes into the shared stats. One bad file never aborts a
//! cycle; failed copies are retried wholesale on the next sweep.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::mirror::MirrorWriter;
use crate::resolver::PathResolver;
use crate::scanner::IntegrityScanner;
use crate::stats::StatsRegistry;
use crate::types::{CopyDirection, RestoreEvent, RestoreOutcome, RestoreTrigger, SweepReport};

/// Commands for the reconciliation worker
#[derive(Debug)]
enum ReconcileCommand {
    /// Run one sweep immediately, replying with its report
    Sweep(oneshot::Sender<SweepReport>),
    /// Stop the worker
    Stop,
}

/// Handle to the running reconciliation worker
#[derive(Clone)]
pub struct ReconcileWorker {
    sender: mpsc::Sender<ReconcileCommand>,
}

impl ReconcileWorker {
    /// Start the worker on its periodic schedule
    pub fn start(
        config: &VaultConfig,
        resolver: PathResolver,
        writer: MirrorWriter,
        stats: StatsRegistry,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<ReconcileCommand>(16);

        let period = config.sweep_interval;
        let concurrency = config.copy_concurrency;

        tokio::spawn(async move {
            // First tick lands one full period out; the composition root or
            // an operator /reconcile call covers the startup sweep
            let mut tick = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    Some(cmd) = receiver.recv() => {
                        match cmd {
                            ReconcileCommand::Sweep(reply) => {
                                let report =
                                    run_sweep(&resolver, &writer, &stats, concurrency).await;
                                let _ = reply.send(report);
                            }
                            ReconcileCommand::Stop => break,
                        }
                    }
                    _ = tick.tick() => {
                        run_sweep(&resolver, &writer, &stats, concurrency).await;
                    }
                }
            }

            tracing::info!("Reconciliation worker stopped");
        });

        Self { sender }
    }

    /// Run one reconciliation cycle now, outside the periodic schedule
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ReconcileCommand::Sweep(reply))
            .await
            .map_err(|_| VaultError::Internal("reconcile worker channel closed".to_string()))?;
        response
            .await
            .map_err(|_| VaultError::Internal("reconcile worker dropped reply".to_string()))
    }

    /// Stop the worker; in-flight copies complete or are abandoned
    pub async fn stop(&self) -> Result<()> {
        self.sender
            .send(ReconcileCommand::Stop)
            .await
            .map_err(|_| VaultError::Internal("reconcile worker channel closed".to_string()))
    }
}

struct CopyJob {
    bucket: String,
    filename: String,
    direction: CopyDirection,
}

/// One full scan-then-copy pass over every configured bucket
pub async fn run_sweep(
    resolver: &PathResolver,
    writer: &MirrorWriter,
    stats: &StatsRegistry,
    concurrency: usize,
) -> SweepReport {
    let started_at = Utc::now();
    let start = std::time::Instant::now();
    let scanner = IntegrityScanner::new(resolver.clone());

    let mut report = SweepReport {
        started_at: Some(started_at),
        ..Default::default()
    };

    let mut jobs: Vec<CopyJob> = Vec::new();

    for bucket in resolver.buckets().to_vec() {
        let scan = match scanner.scan(&bucket).await {
            Ok(scan) => scan,
            Err(e) => {
                tracing::warn!("Scan of bucket {bucket} failed: {e}");
                continue;
            }
        };
        report.buckets_scanned += 1;

        let lost = stats.observe_bucket(&bucket, scan.all_files.iter().cloned());
        for key in lost {
            if let Some((bucket, filename)) = key.split_once('/') {
                // Unrecoverable by this subsystem; escalate, never drop
                tracing::error!(
                    "{}",
                    VaultError::HardLoss {
                        bucket: bucket.to_string(),
                        filename: filename.to_string(),
                    }
                );
            }
            report.hard_losses.push(key);
        }

        for filename in scan.diff.missing_in_primary {
            jobs.push(CopyJob {
                bucket: bucket.clone(),
                filename,
                direction: CopyDirection::Restore,
            });
        }
        for filename in scan.diff.missing_in_mirror {
            jobs.push(CopyJob {
                bucket: bucket.clone(),
                filename,
                direction: CopyDirection::Backup,
            });
        }
    }

    // Bounded concurrency keeps descriptor usage flat on large buckets
    let outcomes = stream::iter(jobs)
        .map(|job| async move {
            let event = execute_copy(resolver, writer, &job, RestoreTrigger::Sweep).await;
            (job.direction, event)
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    for (direction, event) in outcomes {
        let Some(event) = event else {
            continue; // benign race, source vanished
        };
        match (&event.outcome, direction) {
            (RestoreOutcome::Success { .. }, CopyDirection::Restore) => {
                report.files_restored += 1;
            }
            (RestoreOutcome::Success { .. }, CopyDirection::Backup) => {
                report.files_backed_up += 1;
            }
            (RestoreOutcome::Failed { .. }, _) => {
                report.files_failed += 1;
            }
        }
        stats.record_event(event);
    }

    stats.record_sweep();
    report.duration_ms = start.elapsed().as_millis() as u64;

    if report.files_restored > 0 || report.files_backed_up > 0 || report.files_failed > 0 {
        tracing::info!(
            restored = report.files_restored,
            backed_up = report.files_backed_up,
            failed = report.files_failed,
            "Reconciliation sweep completed in {}ms",
            report.duration_ms
        );
    }

    report
}

/// Copy one file in the given direction; `None` means a benign skip
async fn execute_copy(
    resolver: &PathResolver,
    writer: &MirrorWriter,
    job: &CopyJob,
    trigger: RestoreTrigger,
) -> Option<RestoreEvent> {
    let paths = match resolver.resolve(&job.bucket, &job.filename) {
        Ok(paths) => paths,
        Err(e) => {
            // Untracked on-disk name that fails validation; never copied
            tracing::warn!("Skipping unresolvable file {}/{}: {e}", job.bucket, job.filename);
            return None;
        }
    };

    let (source, dest) = match job.direction {
        CopyDirection::Restore => (&paths.mirror, &paths.primary),
        CopyDirection::Backup => (&paths.primary, &paths.mirror),
    };

    match writer.copy(source, dest).await {
        Ok(copy) => Some(RestoreEvent::success(
            &job.bucket,
            &job.filename,
            job.direction,
            trigger,
            copy.bytes,
        )),
        Err(e) if e.is_benign() => {
            tracing::debug!("Source vanished for {}/{}, skipping", job.bucket, job.filename);
            None
        }
        Err(e) => {
            tracing::warn!("Copy failed for {}/{}: {e}", job.bucket, job.filename);
            Some(RestoreEvent::failed(
                &job.bucket,
                &job.filename,
                job.direction,
                trigger,
                e.to_string(),
            ))
        }
    }
}
