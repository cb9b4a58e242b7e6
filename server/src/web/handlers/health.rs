//! Liveness endpoint.

use axum::Json;
use serde_json::{json, Value};

/// `GET /actuator/health`: process liveness. Does not check
/// dependencies.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}
