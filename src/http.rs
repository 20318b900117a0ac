//! HTTP surface for the resilience layer
//!
//! Three routes: the tiered file read path, the health/diagnostics query,
//! and the operator-triggered forced reconciliation. Everything else about
//! the surrounding marketplace application (uploads, auth, CRUD) lives
//! elsewhere and is out of scope here.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::error::VaultError;
use crate::scanner::IntegrityScanner;
use crate::scheduler::ReconcileWorker;
use crate::serve::FallbackResolver;
use crate::stats::StatsRegistry;
use crate::types::HealthReport;

/// Provenance header naming the tier that served the request
pub const TIER_HEADER: &str = "x-storage-tier";

/// Shared handler state, built once at the composition root
#[derive(Clone)]
pub struct AppState {
    pub fallback: FallbackResolver,
    pub scanner: IntegrityScanner,
    pub stats: StatsRegistry,
    pub reconciler: ReconcileWorker,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files/:bucket/:filename", get(serve_file))
        .route("/health", get(health))
        .route("/reconcile", post(reconcile))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Content type for common marketplace media extensions
fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Map a vault error to its HTTP response
fn error_response(err: VaultError) -> Response {
    match err {
        VaultError::InvalidBucket(_) | VaultError::InvalidFilename(_) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
        VaultError::NotFound(payload) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "not_found",
                "bucket": payload.bucket,
                "filename": payload.filename,
                "attempted_paths": payload.attempted_paths,
                "timestamp": payload.timestamp,
            })),
        )
            .into_response(),
        VaultError::StreamError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "stream_error", "detail": err.to_string() })),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": other.to_string() })),
        )
            .into_response(),
    }
}

/// GET /files/{bucket}/{filename}
async fn serve_file(
    State(state): State<AppState>,
    Path((bucket, filename)): Path<(String, String)>,
) -> Response {
    let served = match state.fallback.locate(&bucket, &filename).await {
        Ok(served) => served,
        Err(err) => return error_response(err),
    };

    let file = match state.fallback.open(&served).await {
        Ok(file) => file,
        Err(err) => return error_response(err),
    };

    let stream = ReaderStream::new(file);
    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&filename)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(served.size));
    headers.insert(TIER_HEADER, HeaderValue::from_static(served.tier.as_str()));
    response
}

/// GET /health
async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.stats.snapshot();
    let hard_losses = state.stats.hard_losses();

    let mut per_bucket_file_counts = std::collections::BTreeMap::new();
    let mut missing_file_count = 0usize;

    // Fresh directory reads; no cached listing to go stale
    for bucket in state.scanner.buckets().to_vec() {
        match state.scanner.scan(&bucket).await {
            Ok(scan) => {
                missing_file_count +=
                    scan.diff.missing_in_mirror.len() + scan.diff.missing_in_primary.len();
                per_bucket_file_counts.insert(bucket, scan.diff.primary_count);
            }
            Err(e) => {
                tracing::warn!("Health scan of bucket {bucket} failed: {e}");
            }
        }
    }

    let report = HealthReport {
        is_monitoring: state.stats.watcher_active(),
        last_sweep_time: snapshot.last_sweep_time,
        last_restore_time: snapshot.last_restore_time,
        total_restored: snapshot.total_restored,
        sweep_cycles: snapshot.sweep_cycles,
        per_bucket_file_counts,
        missing_file_count,
        hard_loss_count: hard_losses.len(),
        hard_losses,
    };

    Json(report).into_response()
}

/// POST /reconcile
async fn reconcile(State(state): State<AppState>) -> Response {
    match state.reconciler.sweep_now().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => error_response(err),
    }
}
