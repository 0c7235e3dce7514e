//! Read-only outbox inspection endpoints.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;
use wms_core::error::DomainError;
use wms_core::outbox::{OutboxBacklog, OutboxRecord};
use wms_outbox::StatsSnapshot;

use crate::error::ApiError;
use crate::state::AppState;

/// Backlog plus the publisher's running counters.
#[derive(Debug, Serialize)]
pub struct OutboxStatsResponse {
    pub backlog: OutboxBacklog,
    pub publisher: StatsSnapshot,
}

/// GET /api/v1/outbox/stats
#[instrument(skip(state))]
async fn stats(State(state): State<AppState>) -> Result<Json<OutboxStatsResponse>, ApiError> {
    let backlog = state.outbox.backlog(state.attempt_limit).await?;
    Ok(Json(OutboxStatsResponse {
        backlog,
        publisher: state.publisher_stats.snapshot(),
    }))
}

/// GET /api/v1/outbox/records/{id}
#[instrument(skip(state))]
async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboxRecord>, ApiError> {
    let record = state
        .outbox
        .get(id)
        .await?
        .ok_or(DomainError::OutboxRecordNotFound(id))?;
    Ok(Json(record))
}

/// GET /api/v1/outbox/aggregates/{aggregate_type}/{aggregate_id}
///
/// Every record of one aggregate, published or not, in creation order.
#[instrument(skip(state))]
async fn list_for_aggregate(
    State(state): State<AppState>,
    Path((aggregate_type, aggregate_id)): Path<(String, String)>,
) -> Result<Json<Vec<OutboxRecord>>, ApiError> {
    let records = state
        .outbox
        .find_by_aggregate(&aggregate_type, &aggregate_id)
        .await?;
    Ok(Json(records))
}

/// Returns the router for the outbox endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/records/{id}", get(get_record))
        .route(
            "/aggregates/{aggregate_type}/{aggregate_id}",
            get(list_for_aggregate),
        )
}
