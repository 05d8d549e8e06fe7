//! The delivery ledger: single source of truth for subscriptions and
//! delivery attempts, shared by the ingestion path and the retry sweep.
//!
//! Implementations must honour two rules for every delivery row:
//! - `attempts` only grows, and each attempt increments it atomically.
//! - a row in `success` or `skipped` is never modified again.
//!
//! `pending_since` is set whenever a row enters `pending` and cleared when an
//! outcome is recorded, so a lost attempt is visible as an old pending row.

use async_trait::async_trait;
use vrtrust_core::types::{DbId, Timestamp};

use crate::models::webhook::{
    CreateSubscription, DeliveryFilter, DeliveryOutcome, NewDelivery, UpdateSubscription,
    WebhookDelivery, WebhookSubscription,
};

mod memory;
mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

/// Errors surfaced by a ledger backend.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    // -- subscriptions ------------------------------------------------------

    async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<WebhookSubscription, LedgerError>;

    /// All subscriptions, newest first.
    async fn list_subscriptions(&self) -> Result<Vec<WebhookSubscription>, LedgerError>;

    async fn get_subscription(&self, id: DbId)
        -> Result<Option<WebhookSubscription>, LedgerError>;

    async fn update_subscription(
        &self,
        id: DbId,
        input: &UpdateSubscription,
    ) -> Result<Option<WebhookSubscription>, LedgerError>;

    async fn delete_subscription(&self, id: DbId) -> Result<bool, LedgerError>;

    /// Active subscriptions whose events include `event_type` or `*`,
    /// in ascending id order.
    async fn find_matching(&self, event_type: &str)
        -> Result<Vec<WebhookSubscription>, LedgerError>;

    // -- deliveries ---------------------------------------------------------

    async fn create_delivery(&self, input: &NewDelivery) -> Result<WebhookDelivery, LedgerError>;

    async fn get_delivery(&self, id: DbId) -> Result<Option<WebhookDelivery>, LedgerError>;

    /// Deliveries newest first.
    async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<WebhookDelivery>, LedgerError>;

    /// Apply an attempt to a `pending` delivery and increment `attempts`.
    /// Returns `None` if the row is missing or not pending.
    async fn record_attempt(
        &self,
        id: DbId,
        outcome: &DeliveryOutcome,
    ) -> Result<Option<WebhookDelivery>, LedgerError>;

    /// Atomically move a `failed` delivery with attempts left (and a live
    /// subscription) back to `pending`.
    async fn claim_for_retry(
        &self,
        id: DbId,
        max_retries: i32,
    ) -> Result<Option<WebhookDelivery>, LedgerError>;

    /// Failed deliveries eligible for another attempt at `now`, oldest first.
    async fn list_retryable(
        &self,
        max_retries: i32,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, LedgerError>;

    /// Pending deliveries that entered `pending` before `stale_before`,
    /// oldest first. Their attempt was lost (crash, dropped task, failed
    /// write) and nothing else will finish them.
    async fn list_stranded(
        &self,
        stale_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, LedgerError>;

    /// Atomically reset `pending_since` on a stranded delivery so exactly
    /// one sweeper re-sends it.
    async fn claim_stranded(
        &self,
        id: DbId,
        stale_before: Timestamp,
    ) -> Result<Option<WebhookDelivery>, LedgerError>;

    async fn health_check(&self) -> Result<(), LedgerError>;
}
