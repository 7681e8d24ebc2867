//! vigil-rd library interface
//!
//! Real-time risk & dissonance detection core: per-utterance assessment of
//! deflection patterns, stated-vs-vocal affect dissonance and baseline
//! deviation, fused into a per-user crisis state machine that dispatches
//! crisis events.

pub mod alert;
pub mod api;
pub mod baseline;
pub mod config;
pub mod context;
pub mod dissonance;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod patterns;
pub mod registry;
pub mod risk;
pub mod types;

pub use crate::engine::{EngineError, RiskEngine};
pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vigil_common::events::EventBus;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Detection core
    pub engine: Arc<RiskEngine>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<RiskEngine>) -> Self {
        let event_bus = engine.event_bus().clone();
        Self {
            engine,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::assess_routes())
        .merge(api::user_routes())
        .merge(api::taxonomy_routes())
        .merge(api::alert_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
