//! mediavault server
//!
//! Run with: mediavault-server --primary-root /var/media --mirror-root /mnt/backup/media

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediavault::config::VaultConfig;
use mediavault::http::{router, AppState};
use mediavault::mirror::MirrorWriter;
use mediavault::resolver::PathResolver;
use mediavault::scanner::IntegrityScanner;
use mediavault::scheduler::ReconcileWorker;
use mediavault::serve::FallbackResolver;
use mediavault::stats::StatsRegistry;
use mediavault::watcher::ChangeWatcher;

#[derive(Parser, Debug)]
#[command(name = "mediavault-server")]
#[command(about = "Self-healing media storage server", version)]
struct Args {
    /// Primary storage root (ephemeral volume)
    #[arg(long, env = "MEDIAVAULT_PRIMARY_ROOT", default_value = "~/media/primary")]
    primary_root: String,

    /// Mirror storage root (durable volume)
    #[arg(long, env = "MEDIAVAULT_MIRROR_ROOT", default_value = "~/media/mirror")]
    mirror_root: String,

    /// Comma-separated bucket names
    #[arg(
        long,
        env = "MEDIAVAULT_BUCKETS",
        default_value = "avatars,gallery,videos,documents"
    )]
    buckets: String,

    /// Seconds between reconciliation sweeps
    #[arg(long, env = "MEDIAVAULT_SWEEP_INTERVAL", default_value = "30")]
    sweep_interval_seconds: u64,

    /// Maximum concurrent copies within one sweep
    #[arg(long, env = "MEDIAVAULT_COPY_CONCURRENCY", default_value = "8")]
    copy_concurrency: usize,

    /// Per-copy timeout in seconds
    #[arg(long, env = "MEDIAVAULT_COPY_TIMEOUT", default_value = "20")]
    copy_timeout_seconds: u64,

    /// Disable the real-time change watcher (sweeps only)
    #[arg(long, env = "MEDIAVAULT_NO_WATCH")]
    no_watch: bool,

    /// HTTP listen port
    #[arg(long, env = "MEDIAVAULT_PORT", default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = VaultConfig::new(
        shellexpand::tilde(&args.primary_root).to_string(),
        shellexpand::tilde(&args.mirror_root).to_string(),
    );
    config.buckets = args
        .buckets
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    config.sweep_interval = Duration::from_secs(args.sweep_interval_seconds.max(1));
    config.copy_concurrency = args.copy_concurrency;
    config.copy_timeout = Duration::from_secs(args.copy_timeout_seconds.max(1));
    config.validate().context("invalid configuration")?;

    tracing::info!(
        "mediavault {} starting: primary={} mirror={} buckets={:?}",
        mediavault::VERSION,
        config.primary_root.display(),
        config.mirror_root.display(),
        config.buckets
    );

    let resolver = PathResolver::new(Arc::new(config.clone()));
    let writer = MirrorWriter::new(config.copy_timeout);
    let stats = StatsRegistry::new();

    let reconciler =
        ReconcileWorker::start(&config, resolver.clone(), writer.clone(), stats.clone());

    // Startup sweep: converge whatever diverged while the process was down
    match reconciler.sweep_now().await {
        Ok(report) => tracing::info!(
            "Startup sweep: {} restored, {} backed up, {} failed",
            report.files_restored,
            report.files_backed_up,
            report.files_failed
        ),
        Err(e) => tracing::warn!("Startup sweep failed: {e}"),
    }

    let watcher = if args.no_watch {
        tracing::info!("Change watcher disabled; relying on sweeps only");
        None
    } else {
        let watcher =
            ChangeWatcher::start(resolver.clone(), writer.clone(), stats.clone()).await;
        if !watcher.is_active() {
            tracing::warn!("Change watcher degraded to no-op");
        }
        Some(watcher)
    };

    let state = AppState {
        fallback: FallbackResolver::new(resolver.clone()),
        scanner: IntegrityScanner::new(resolver),
        stats,
        reconciler: reconciler.clone(),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconciler.stop().await.ok();
    drop(watcher);
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install ctrl-c handler: {e}");
    }
}
