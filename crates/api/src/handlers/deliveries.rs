//! Delivery ledger introspection and manual retry.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use vrtrust_core::delivery::DeliveryStatus;
use vrtrust_core::error::CoreError;
use vrtrust_core::types::DbId;
use vrtrust_db::models::webhook::DeliveryFilter;

use crate::error::{AppError, AppResult};
use crate::query::{clamp_limit, clamp_offset, DeliveryListParams, DEFAULT_LIMIT, MAX_LIMIT};
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Delivery",
        id,
    })
}

/// GET /api/webhook-deliveries?subscriptionId=&status=&limit=&offset=
///
/// Newest first.
pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(params): Query<DeliveryListParams>,
) -> AppResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(DeliveryStatus::from_str)
        .transpose()?;

    let filter = DeliveryFilter {
        subscription_id: params.subscription_id,
        status,
        limit: clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT),
        offset: clamp_offset(params.offset),
    };
    let deliveries = state.ledger().list_deliveries(&filter).await?;

    Ok(Json(DataResponse { data: deliveries }))
}

/// GET /api/webhook-delivery/{id}
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let delivery = state
        .ledger()
        .get_delivery(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: delivery }))
}

/// POST /api/webhook-delivery/{id}/retry
///
/// Re-drive a failed delivery now, ignoring its backoff. Only failed
/// deliveries with attempts left and a live subscription qualify.
pub async fn retry_delivery(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let engine = state.pipeline.engine();
    if let Some(updated) = engine.retry(id).await? {
        tracing::info!(
            delivery_id = id,
            status = %updated.status,
            attempts = updated.attempts,
            "Manual retry finished"
        );
        return Ok(Json(DataResponse { data: updated }));
    }

    let existing = state
        .ledger()
        .get_delivery(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Err(AppError::Core(CoreError::Conflict(format!(
        "Delivery {id} cannot be retried (status {}, {} of {} attempts used)",
        existing.status,
        existing.attempts,
        engine.config().max_retries
    ))))
}
