//! Route definitions for ingestion, subscriptions, deliveries, and CSV transfer.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{deliveries, ingest, intelligence, subscriptions, transfer};
use crate::state::AppState;

/// Webhook routes mounted at `/api`.
///
/// `/webhook/{key}` is shared: `POST` ingests for source `key`, the other
/// methods manage subscription `key`.
///
/// ```text
/// POST   /universal-webhook                 -> missing_source (400)
/// POST   /universal-webhook/{source}        -> ingest_webhook
/// GET    /webhook, /webhooks                -> list_subscriptions
/// POST   /webhook, /webhooks                -> create_subscription
/// POST   /webhook/{source}                  -> ingest_webhook
/// GET    /webhook/{id}                      -> get_subscription
/// PATCH  /webhook/{id}                      -> update_subscription
/// DELETE /webhook/{id}                      -> delete_subscription
/// POST   /test-webhook/{id}                 -> test_subscription
/// GET    /webhook-deliveries                -> list_deliveries
/// GET    /webhook-delivery/{id}             -> get_delivery
/// POST   /webhook-delivery/{id}/retry       -> retry_delivery
/// POST   /import/webhooks                   -> import_subscriptions
/// GET    /export/webhooks                   -> export_subscriptions
/// GET    /event-intelligence/history        -> classification_history
/// ```
pub fn router() -> Router<AppState> {
    let collection = get(subscriptions::list_subscriptions).post(subscriptions::create_subscription);

    Router::new()
        .route("/universal-webhook", post(ingest::missing_source))
        .route("/universal-webhook/{source}", post(ingest::ingest_webhook))
        .route("/webhook", collection.clone())
        .route("/webhooks", collection)
        .route(
            "/webhook/{key}",
            get(subscriptions::get_subscription)
                .patch(subscriptions::update_subscription)
                .delete(subscriptions::delete_subscription)
                .post(ingest::ingest_webhook),
        )
        .route("/test-webhook/{id}", post(subscriptions::test_subscription))
        .route("/webhook-deliveries", get(deliveries::list_deliveries))
        .route("/webhook-delivery/{id}", get(deliveries::get_delivery))
        .route("/webhook-delivery/{id}/retry", post(deliveries::retry_delivery))
        .route("/import/webhooks", post(transfer::import_subscriptions))
        .route("/export/webhooks", get(transfer::export_subscriptions))
        .route(
            "/event-intelligence/history",
            get(intelligence::classification_history),
        )
}
