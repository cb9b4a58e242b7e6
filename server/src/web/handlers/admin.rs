//! Demo/admin endpoints. Public paths: no caller identity required.

use crate::service::{ClearedCounts, StatsCounts};
use crate::web::error::ApiError;
use crate::web::identity::RequestId;
use crate::web::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Body of `POST /api/v1/demo/reset`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    /// Always `reset_complete`.
    pub status: &'static str,
    /// When the reset finished.
    pub timestamp: DateTime<Utc>,
    /// Rows removed per store.
    pub cleared: ClearedCounts,
}

/// `GET /api/v1/demo/stats`: current entity counts.
pub async fn stats(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<StatsCounts>, ApiError> {
    let counts = state
        .admin
        .stats()
        .await
        .map_err(|e| ApiError::store(&e, &request_id.0))?;
    Ok(Json(counts))
}

/// `POST /api/v1/demo/reset`: wipe every store and rezero counters.
pub async fn reset(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<ResetResponse>, ApiError> {
    let cleared = state
        .admin
        .reset()
        .await
        .map_err(|e| ApiError::store(&e, &request_id.0))?;
    Ok(Json(ResetResponse {
        status: "reset_complete",
        timestamp: Utc::now(),
        cleared,
    }))
}
