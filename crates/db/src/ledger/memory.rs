use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vrtrust_core::delivery::DeliveryStatus;
use vrtrust_core::types::{DbId, Timestamp};

use super::{DeliveryLedger, LedgerError};
use crate::models::webhook::{
    CreateSubscription, DeliveryFilter, DeliveryOutcome, NewDelivery, UpdateSubscription,
    WebhookDelivery, WebhookSubscription,
};

#[derive(Default)]
struct Tables {
    subscriptions: BTreeMap<DbId, WebhookSubscription>,
    deliveries: BTreeMap<DbId, WebhookDelivery>,
    next_subscription_id: DbId,
    next_delivery_id: DbId,
}

impl Tables {
    fn next_subscription_id(&mut self) -> DbId {
        self.next_subscription_id += 1;
        self.next_subscription_id
    }

    fn next_delivery_id(&mut self) -> DbId {
        self.next_delivery_id += 1;
        self.next_delivery_id
    }
}

/// In-process ledger used when no database is configured, and in tests.
///
/// Every mutation takes the write lock, so per-record updates are serialized.
/// Contents are lost on restart.
#[derive(Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryLedger for MemoryLedger {
    async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<WebhookSubscription, LedgerError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let subscription = WebhookSubscription {
            id: tables.next_subscription_id(),
            name: input.name.clone(),
            url: input.url.trim().to_string(),
            secret: input.resolved_secret(),
            events: input.events.clone(),
            is_active: input.is_active.unwrap_or(true),
            headers: input.headers.clone(),
            partner_id: input.partner_id,
            created_at: now,
            updated_at: now,
        };
        tables
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn list_subscriptions(&self) -> Result<Vec<WebhookSubscription>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.subscriptions.values().rev().cloned().collect())
    }

    async fn get_subscription(
        &self,
        id: DbId,
    ) -> Result<Option<WebhookSubscription>, LedgerError> {
        Ok(self.tables.read().await.subscriptions.get(&id).cloned())
    }

    async fn update_subscription(
        &self,
        id: DbId,
        input: &UpdateSubscription,
    ) -> Result<Option<WebhookSubscription>, LedgerError> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.subscriptions.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            existing.name = name.clone();
        }
        if let Some(url) = &input.url {
            existing.url = url.trim().to_string();
        }
        if let Some(secret) = &input.secret {
            existing.secret = secret.clone();
        }
        if let Some(events) = &input.events {
            existing.events = events.clone();
        }
        if let Some(is_active) = input.is_active {
            existing.is_active = is_active;
        }
        if let Some(headers) = &input.headers {
            existing.headers = headers.clone();
        }
        if let Some(partner_id) = input.partner_id {
            existing.partner_id = partner_id;
        }
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete_subscription(&self, id: DbId) -> Result<bool, LedgerError> {
        let mut tables = self.tables.write().await;
        if tables.subscriptions.remove(&id).is_none() {
            return Ok(false);
        }
        for delivery in tables.deliveries.values_mut() {
            if delivery.subscription_id == Some(id) {
                delivery.subscription_id = None;
            }
        }
        Ok(true)
    }

    async fn find_matching(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.matches(event_type))
            .cloned()
            .collect())
    }

    async fn create_delivery(&self, input: &NewDelivery) -> Result<WebhookDelivery, LedgerError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let delivery = WebhookDelivery {
            id: tables.next_delivery_id(),
            subscription_id: input.subscription_id,
            source: input.source.clone(),
            event_type: input.event_type.clone(),
            payload: input.payload.clone(),
            status: input.status,
            status_code: None,
            response: None,
            error_message: None,
            attempts: 0,
            next_attempt_at: None,
            pending_since: (input.status == DeliveryStatus::Pending).then_some(now),
            created_at: now,
            processed_at: (input.status == DeliveryStatus::Skipped).then_some(now),
        };
        tables.deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn get_delivery(&self, id: DbId) -> Result<Option<WebhookDelivery>, LedgerError> {
        Ok(self.tables.read().await.deliveries.get(&id).cloned())
    }

    async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<WebhookDelivery>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deliveries
            .values()
            .rev()
            .filter(|d| filter.subscription_id.is_none() || d.subscription_id == filter.subscription_id)
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn record_attempt(
        &self,
        id: DbId,
        outcome: &DeliveryOutcome,
    ) -> Result<Option<WebhookDelivery>, LedgerError> {
        let mut tables = self.tables.write().await;
        let Some(delivery) = tables.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        if delivery.status != DeliveryStatus::Pending {
            return Ok(None);
        }
        delivery.status = outcome.status();
        delivery.status_code = outcome.status_code;
        delivery.response = outcome.response.clone();
        delivery.error_message = outcome.error_message.clone();
        delivery.next_attempt_at = if outcome.success {
            None
        } else {
            outcome.next_attempt_at
        };
        delivery.attempts += 1;
        delivery.pending_since = None;
        delivery.processed_at = Some(Utc::now());
        Ok(Some(delivery.clone()))
    }

    async fn claim_for_retry(
        &self,
        id: DbId,
        max_retries: i32,
    ) -> Result<Option<WebhookDelivery>, LedgerError> {
        let mut tables = self.tables.write().await;
        let Some(delivery) = tables.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        let claimable = delivery.status == DeliveryStatus::Failed
            && delivery.attempts < max_retries
            && delivery.subscription_id.is_some();
        if !claimable {
            return Ok(None);
        }
        delivery.status = DeliveryStatus::Pending;
        delivery.pending_since = Some(Utc::now());
        Ok(Some(delivery.clone()))
    }

    async fn list_retryable(
        &self,
        max_retries: i32,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .deliveries
            .values()
            .filter(|d| d.status == DeliveryStatus::Failed)
            .filter(|d| d.attempts < max_retries)
            .filter(|d| d.subscription_id.is_some())
            .filter(|d| d.next_attempt_at.map_or(true, |at| at <= now))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_stranded(
        &self,
        stale_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, LedgerError> {
        let tables = self.tables.read().await;
        let mut stranded: Vec<WebhookDelivery> = tables
            .deliveries
            .values()
            .filter(|d| is_stranded(d, stale_before))
            .cloned()
            .collect();
        stranded.sort_by_key(|d| (d.pending_since, d.id));
        stranded.truncate(limit.max(0) as usize);
        Ok(stranded)
    }

    async fn claim_stranded(
        &self,
        id: DbId,
        stale_before: Timestamp,
    ) -> Result<Option<WebhookDelivery>, LedgerError> {
        let mut tables = self.tables.write().await;
        let Some(delivery) = tables.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        if !is_stranded(delivery, stale_before) {
            return Ok(None);
        }
        delivery.pending_since = Some(Utc::now());
        Ok(Some(delivery.clone()))
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

fn is_stranded(delivery: &WebhookDelivery, stale_before: Timestamp) -> bool {
    delivery.status == DeliveryStatus::Pending
        && delivery.pending_since.is_some_and(|since| since < stale_before)
}
