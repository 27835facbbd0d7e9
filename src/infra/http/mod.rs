//! HTTP surface: health, homepage preload and content-update ingress.

mod middleware;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::warn;

use crate::application::error::AppError;
use crate::application::preload::PreloadAggregator;
use crate::domain::content::ContentUpdate;
use crate::domain::types::ContentType;
use crate::infra::snapshots::{SnapshotStatus, SnapshotStore};
use crate::sync::{FlushReport, SyncCoordinator, SyncStatus};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub aggregator: Arc<PreloadAggregator>,
    pub coordinator: SyncCoordinator,
    pub snapshots: Arc<SnapshotStore>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    snapshots: SnapshotStatus,
    sync: SyncStatus,
}

#[derive(Debug, Serialize)]
struct QueuedResponse {
    queued: ContentType,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/preload", get(preload))
        .route("/sync", post(queue_update))
        .route("/sync/flush", post(flush))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health(State(state): State<HttpState>) -> Result<Json<HealthReport>, AppError> {
    let sync = state.coordinator.status()?;
    let snapshots = state.snapshots.status().await;
    Ok(Json(HealthReport { snapshots, sync }))
}

/// Always answers 200; a resource no tier could provide is listed in
/// `metadata.unavailable` and left empty so the page renders without it.
async fn preload(State(state): State<HttpState>) -> Response {
    match state.aggregator.load().await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            warn!(error = %err, "Serving degraded homepage payload");
            Json(err.into_partial()).into_response()
        }
    }
}

async fn queue_update(
    State(state): State<HttpState>,
    Json(update): Json<ContentUpdate>,
) -> Result<(StatusCode, Json<QueuedResponse>), AppError> {
    let content_type = update.content_type();
    state.coordinator.queue_update(update)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            queued: content_type,
        }),
    ))
}

async fn flush(State(state): State<HttpState>) -> Result<Json<FlushReport>, AppError> {
    let report = state.coordinator.sync_now().await?;
    Ok(Json(report))
}
