//! HTTP surface: ingestion, health, metrics.

use super::Administrator;
use crate::models::PageData;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Binary page records; the decoder is bincode, so no other content type
/// can be honored.
const INGEST_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
struct ApiState {
    admin: Arc<Administrator>,
    metrics: PrometheusHandle,
}

/// Build the service router. Public so integration tests can drive the
/// surface without binding a socket.
pub fn router(admin: Arc<Administrator>, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/index", post(ingest))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(ApiState { admin, metrics })
}

/// Serve until the shutdown token fires, then drain connections.
pub(crate) async fn serve(
    admin: Arc<Administrator>,
    port: &str,
    metrics: PrometheusHandle,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(admin, metrics);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    info!(port, "HTTP ingestion service listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn ingest(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type != INGEST_CONTENT_TYPE {
        warn!(content_type, "unsupported ingest content type");
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("expected Content-Type: {INGEST_CONTENT_TYPE}"),
        )
            .into_response();
    }

    let page: PageData = match bincode::deserialize(&body) {
        Ok(page) => page,
        Err(err) => {
            warn!(error = %err, "failed to decode incoming page record");
            return (StatusCode::BAD_REQUEST, "failed to decode request").into_response();
        }
    };

    match state.admin.enqueue_page_data(page) {
        Ok(()) => (StatusCode::ACCEPTED, "Page data enqueued").into_response(),
        Err(err) => {
            error!(error = %err, "failed to enqueue page data");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to enqueue page data",
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    queue_depth: usize,
    workers: usize,
    uptime: String,
    start_time: DateTime<Utc>,
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let start_time = state.admin.start_time();
    let uptime = (Utc::now() - start_time)
        .to_std()
        .unwrap_or_default();

    Json(HealthResponse {
        status: "OK".to_string(),
        queue_depth: state.admin.queue_depth(),
        workers: state.admin.worker_count(),
        uptime: format!("{uptime:?}"),
        start_time,
    })
}

async fn render_metrics(State(state): State<ApiState>) -> String {
    state.metrics.render()
}
