use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::app_state::AppState;

/// Defines health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
}

/// Process is up. Does not touch the database.
async fn liveness_check() -> Json<Value> {
    Json(json!({ "success": true, "message": "API is live" }))
}

/// Store answers a round trip; `503` otherwise.
async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.desk.ready().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "Database unavailable", "details": e.to_string() })),
        )
    })?;

    Ok(Json(json!({ "success": true, "message": "API is ready" })))
}
