//! Pattern taxonomy endpoints
//!
//! GET /taxonomy, POST /taxonomy/reload

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::ApiResult;
use crate::patterns::TaxonomySnapshot;
use crate::AppState;

/// Active taxonomy summary
#[derive(Debug, Serialize)]
pub struct TaxonomyResponse {
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    pub entry_count: usize,
    /// Entry count per language tag
    pub languages: BTreeMap<String, usize>,
}

impl From<&TaxonomySnapshot> for TaxonomyResponse {
    fn from(snapshot: &TaxonomySnapshot) -> Self {
        let mut languages = BTreeMap::new();
        for entry in snapshot.entries() {
            *languages.entry(entry.entry.language.clone()).or_insert(0) += 1;
        }
        Self {
            version: snapshot.version().to_string(),
            loaded_at: snapshot.loaded_at(),
            entry_count: snapshot.len(),
            languages,
        }
    }
}

/// GET /taxonomy
pub async fn get_taxonomy(State(state): State<AppState>) -> Json<TaxonomyResponse> {
    Json(TaxonomyResponse::from(state.engine.taxonomy().as_ref()))
}

/// POST /taxonomy/reload
///
/// Re-reads the configured taxonomy file. On failure (422) the previous
/// snapshot stays active.
pub async fn reload_taxonomy(State(state): State<AppState>) -> ApiResult<Json<TaxonomyResponse>> {
    let snapshot = state.engine.reload_taxonomy().await?;
    Ok(Json(TaxonomyResponse::from(snapshot.as_ref())))
}

/// Build taxonomy routes
pub fn taxonomy_routes() -> Router<AppState> {
    Router::new()
        .route("/taxonomy", get(get_taxonomy))
        .route("/taxonomy/reload", post(reload_taxonomy))
}
