//! Handlers for webhook subscription management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use vrtrust_core::error::CoreError;
use vrtrust_core::types::DbId;
use vrtrust_db::models::webhook::{CreateSubscription, UpdateSubscription};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Subscription",
        id,
    })
}

/// POST /api/webhook
/// POST /api/webhooks
///
/// Create a subscription. A missing `secret` is generated.
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(input): Json<CreateSubscription>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let subscription = state.ledger().create_subscription(&input).await?;

    tracing::info!(
        subscription_id = subscription.id,
        url = %subscription.url,
        events = ?subscription.events,
        "Subscription created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: subscription })))
}

/// GET /api/webhook
/// GET /api/webhooks
pub async fn list_subscriptions(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let subscriptions = state.ledger().list_subscriptions().await?;
    Ok(Json(DataResponse {
        data: subscriptions,
    }))
}

/// GET /api/webhook/{id}
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let subscription = state
        .ledger()
        .get_subscription(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: subscription }))
}

/// PATCH /api/webhook/{id}
///
/// Update any subset of fields, including enabling or disabling.
pub async fn update_subscription(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateSubscription>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let updated = state
        .ledger()
        .update_subscription(id, &input)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(subscription_id = id, is_active = updated.is_active, "Subscription updated");

    Ok(Json(DataResponse { data: updated }))
}

/// DELETE /api/webhook/{id}
///
/// Stops future matching. Existing delivery records are kept.
pub async fn delete_subscription(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !state.ledger().delete_subscription(id).await? {
        return Err(not_found(id));
    }

    tracing::info!(subscription_id = id, "Subscription deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/test-webhook/{id}
///
/// Send a synthesized `webhook.test` event to one subscription and return the
/// resulting delivery record.
pub async fn test_subscription(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let delivery = state
        .pipeline
        .send_test(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(
        subscription_id = id,
        delivery_id = delivery.id,
        status = %delivery.status,
        "Test delivery sent"
    );

    Ok(Json(DataResponse { data: delivery }))
}
