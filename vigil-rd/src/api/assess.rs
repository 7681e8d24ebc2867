//! POST /assess

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};

use crate::error::ApiResult;
use crate::ingest::UpstreamPayload;
use crate::types::RiskAssessment;
use crate::AppState;

/// POST /assess
///
/// Assess one upstream utterance payload.
///
/// - 200 with the `RiskAssessment`
/// - 400 for malformed payloads, including bodies that fail to deserialize
/// - 409 for duplicate or out-of-order sequence numbers
pub async fn assess(
    State(state): State<AppState>,
    payload: Result<Json<UpstreamPayload>, JsonRejection>,
) -> ApiResult<Json<RiskAssessment>> {
    let Json(payload) = payload?;
    let assessment = state.engine.assess(payload).await?;
    Ok(Json(assessment))
}

/// Build assessment routes
pub fn assess_routes() -> Router<AppState> {
    Router::new().route("/assess", post(assess))
}
