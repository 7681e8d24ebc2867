//! Per-user operator endpoints
//!
//! GET /users/:user_id/crisis, GET /users/:user_id/assessments,
//! POST /users/:user_id/acknowledge, POST /users/:user_id/baseline/reset

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_common::CrisisState;

use crate::engine::CrisisSummary;
use crate::error::{ApiError, ApiResult};
use crate::types::RiskAssessment;
use crate::AppState;

/// GET /users/:user_id/assessments query
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum assessments returned (default 20)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// POST /users/:user_id/acknowledge response
#[derive(Debug, Serialize)]
pub struct AcknowledgeResponse {
    pub user_id: String,
    pub old_state: CrisisState,
    pub new_state: CrisisState,
    /// False when the session was not Escalated
    pub changed: bool,
    pub acknowledged_at: DateTime<Utc>,
}

/// POST /users/:user_id/baseline/reset response
#[derive(Debug, Serialize)]
pub struct BaselineResetResponse {
    pub user_id: String,
    pub generation: u64,
}

/// GET /users/:user_id/crisis
pub async fn get_crisis(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<CrisisSummary>> {
    Ok(Json(state.engine.crisis_summary(&user_id).await?))
}

/// GET /users/:user_id/assessments?limit=N
///
/// Most recent assessments, newest first.
pub async fn get_assessments(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<RiskAssessment>>> {
    if query.limit == 0 {
        return Err(ApiError::BadRequest("limit must be >= 1".to_string()));
    }
    Ok(Json(state.engine.history(&user_id, query.limit).await?))
}

/// POST /users/:user_id/acknowledge
///
/// Operator acknowledgement: Escalated → Cooldown, no-op in other states.
pub async fn acknowledge(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<AcknowledgeResponse>> {
    let transition = state.engine.acknowledge(&user_id).await?;
    Ok(Json(AcknowledgeResponse {
        user_id,
        old_state: transition.old_state,
        new_state: transition.new_state,
        changed: transition.changed(),
        acknowledged_at: transition.at,
    }))
}

/// POST /users/:user_id/baseline/reset
pub async fn reset_baseline(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<BaselineResetResponse>> {
    let generation = state.engine.reset_baseline(&user_id).await?;
    Ok(Json(BaselineResetResponse {
        user_id,
        generation,
    }))
}

/// Build per-user routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/crisis", get(get_crisis))
        .route("/users/:user_id/assessments", get(get_assessments))
        .route("/users/:user_id/acknowledge", post(acknowledge))
        .route("/users/:user_id/baseline/reset", post(reset_baseline))
}
