//! Classifier diagnostics.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use vrtrust_core::classifier::HISTORY_CAPACITY;

use crate::error::AppResult;
use crate::query::{clamp_limit, LimitParams};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/event-intelligence/history?limit=
///
/// Most recent classifications, newest first.
pub async fn classification_history(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, 50, HISTORY_CAPACITY as i64) as usize;
    let history = state.pipeline.classifier().history(limit);
    Ok(Json(DataResponse { data: history }))
}
