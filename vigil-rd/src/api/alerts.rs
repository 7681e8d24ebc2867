//! GET /alerts/failed

use axum::{extract::State, routing::get, Json, Router};

use crate::alert::DeadLetter;
use crate::AppState;

/// GET /alerts/failed
///
/// Crisis events that exhausted their delivery retries, oldest first.
pub async fn failed_alerts(State(state): State<AppState>) -> Json<Vec<DeadLetter>> {
    Json(state.engine.dead_letters())
}

/// Build alert routes
pub fn alert_routes() -> Router<AppState> {
    Router::new().route("/alerts/failed", get(failed_alerts))
}
