pub mod health;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /universal-webhook/{source}      inbound events
/// /webhook, /webhooks, /webhook/{} subscriptions (and inbound events)
/// /test-webhook/{id}               test trigger
/// /webhook-deliveries              delivery ledger
/// /webhook-delivery/{id}[/retry]
/// /import/webhooks                 CSV upload
/// /export/webhooks                 CSV download
/// /event-intelligence/history      classifier diagnostics
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(webhooks::router())
}
