use async_trait::async_trait;
use vrtrust_core::types::{DbId, Timestamp};

use super::{DeliveryLedger, LedgerError};
use crate::models::webhook::{
    CreateSubscription, DeliveryFilter, DeliveryOutcome, NewDelivery, UpdateSubscription,
    WebhookDelivery, WebhookSubscription,
};
use crate::repositories::WebhookRepo;
use crate::DbPool;

/// PostgreSQL-backed ledger.
#[derive(Clone)]
pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DeliveryLedger for PgLedger {
    async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<WebhookSubscription, LedgerError> {
        let secret = input.resolved_secret();
        Ok(WebhookRepo::create(&self.pool, input, &secret).await?)
    }

    async fn list_subscriptions(&self) -> Result<Vec<WebhookSubscription>, LedgerError> {
        Ok(WebhookRepo::list(&self.pool).await?)
    }

    async fn get_subscription(
        &self,
        id: DbId,
    ) -> Result<Option<WebhookSubscription>, LedgerError> {
        Ok(WebhookRepo::find_by_id(&self.pool, id).await?)
    }

    async fn update_subscription(
        &self,
        id: DbId,
        input: &UpdateSubscription,
    ) -> Result<Option<WebhookSubscription>, LedgerError> {
        Ok(WebhookRepo::update(&self.pool, id, input).await?)
    }

    async fn delete_subscription(&self, id: DbId) -> Result<bool, LedgerError> {
        Ok(WebhookRepo::delete(&self.pool, id).await?)
    }

    async fn find_matching(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, LedgerError> {
        Ok(WebhookRepo::find_matching(&self.pool, event_type).await?)
    }

    async fn create_delivery(&self, input: &NewDelivery) -> Result<WebhookDelivery, LedgerError> {
        Ok(WebhookRepo::create_delivery(&self.pool, input).await?)
    }

    async fn get_delivery(&self, id: DbId) -> Result<Option<WebhookDelivery>, LedgerError> {
        Ok(WebhookRepo::find_delivery_by_id(&self.pool, id).await?)
    }

    async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<WebhookDelivery>, LedgerError> {
        Ok(WebhookRepo::list_deliveries(&self.pool, filter).await?)
    }

    async fn record_attempt(
        &self,
        id: DbId,
        outcome: &DeliveryOutcome,
    ) -> Result<Option<WebhookDelivery>, LedgerError> {
        Ok(WebhookRepo::record_attempt(&self.pool, id, outcome).await?)
    }

    async fn claim_for_retry(
        &self,
        id: DbId,
        max_retries: i32,
    ) -> Result<Option<WebhookDelivery>, LedgerError> {
        Ok(WebhookRepo::claim_for_retry(&self.pool, id, max_retries).await?)
    }

    async fn list_retryable(
        &self,
        max_retries: i32,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, LedgerError> {
        Ok(WebhookRepo::list_retryable(&self.pool, max_retries, now, limit).await?)
    }

    async fn list_stranded(
        &self,
        stale_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, LedgerError> {
        Ok(WebhookRepo::list_stranded(&self.pool, stale_before, limit).await?)
    }

    async fn claim_stranded(
        &self,
        id: DbId,
        stale_before: Timestamp,
    ) -> Result<Option<WebhookDelivery>, LedgerError> {
        Ok(WebhookRepo::claim_stranded(&self.pool, id, stale_before).await?)
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
