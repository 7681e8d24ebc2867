//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("vigil-rd")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Active pattern taxonomy version
    pub taxonomy_version: String,
    /// Users with live state
    pub tracked_users: usize,
    /// Notification sink crisis events are delivered to
    pub alert_sink: String,
    /// Crisis events that exhausted their retries
    pub failed_alerts: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "vigil-rd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        taxonomy_version: state.engine.taxonomy().version().to_string(),
        tracked_users: state.engine.user_count().await,
        alert_sink: state.engine.alert_sink().to_string(),
        failed_alerts: state.engine.dead_letters().len(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
