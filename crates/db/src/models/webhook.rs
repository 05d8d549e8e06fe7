//! Webhook subscription and delivery ledger models and DTOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use vrtrust_core::delivery::DeliveryStatus;
use vrtrust_core::error::CoreError;
use vrtrust_core::subscription_csv::SubscriptionRow;
use vrtrust_core::subscriptions::{
    matches_event, validate_events, validate_headers, validate_name, validate_url,
};
use vrtrust_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A row from the `webhook_subscriptions` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub id: DbId,
    pub name: String,
    pub url: String,
    pub secret: String,
    #[sqlx(json)]
    pub events: Vec<String>,
    pub is_active: bool,
    #[sqlx(json)]
    pub headers: BTreeMap<String, String>,
    pub partner_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookSubscription {
    /// Whether this subscription should receive `event_type`.
    pub fn matches(&self, event_type: &str) -> bool {
        matches_event(self.is_active, &self.events, event_type)
    }

    /// The subset of fields carried by CSV export.
    pub fn to_row(&self) -> SubscriptionRow {
        SubscriptionRow {
            name: self.name.clone(),
            url: self.url.clone(),
            secret: self.secret.clone(),
            events: self.events.clone(),
            is_active: self.is_active,
            partner_id: self.partner_id,
            headers: self.headers.clone(),
        }
    }
}

/// DTO for creating a new subscription.
///
/// A missing `secret` is generated on insert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscription {
    #[serde(default)]
    pub name: String,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub partner_id: Option<DbId>,
}

impl CreateSubscription {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_name(&self.name)?;
        validate_url(&self.url)?;
        validate_events(&self.events)?;
        validate_headers(&self.headers)
    }

    /// The secret to store: the provided one, or a fresh random token.
    pub fn resolved_secret(&self) -> String {
        match self.secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => generate_secret(),
        }
    }
}

impl From<SubscriptionRow> for CreateSubscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            name: row.name,
            url: row.url,
            secret: Some(row.secret).filter(|s| !s.is_empty()),
            events: row.events,
            is_active: Some(row.is_active),
            headers: row.headers,
            partner_id: row.partner_id,
        }
    }
}

/// DTO for updating an existing subscription. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscription {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub headers: Option<BTreeMap<String, String>>,
    /// `Some(None)` (an explicit `null`) clears the partner.
    #[serde(default, deserialize_with = "present")]
    pub partner_id: Option<Option<DbId>>,
}

/// Marks a field as present even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateSubscription {
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(url) = &self.url {
            validate_url(url)?;
        }
        if let Some(secret) = &self.secret {
            if secret.trim().is_empty() {
                return Err(CoreError::Validation(
                    "Subscription secret must not be empty".to_string(),
                ));
            }
        }
        if let Some(events) = &self.events {
            validate_events(events)?;
        }
        if let Some(headers) = &self.headers {
            validate_headers(headers)?;
        }
        Ok(())
    }
}

/// Random signing secret: 64 hex characters.
pub fn generate_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A row from the `webhook_deliveries` table.
///
/// `subscription_id` is `None` for skipped events and for deliveries whose
/// subscription has since been deleted.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    pub id: DbId,
    pub subscription_id: Option<DbId>,
    pub source: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub status: DeliveryStatus,
    pub status_code: Option<i32>,
    pub response: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub next_attempt_at: Option<Timestamp>,
    /// Set while `pending`; an old value means the attempt was lost.
    pub pending_since: Option<Timestamp>,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

/// Insert DTO for a delivery record.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub subscription_id: Option<DbId>,
    pub source: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
}

impl NewDelivery {
    /// A pending delivery to one subscription.
    pub fn pending(
        subscription_id: DbId,
        source: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            subscription_id: Some(subscription_id),
            source: source.to_string(),
            event_type: event_type.to_string(),
            payload,
            status: DeliveryStatus::Pending,
        }
    }

    /// A terminal record for an event no subscription matched.
    pub fn skipped(source: &str, event_type: &str, payload: serde_json::Value) -> Self {
        Self {
            subscription_id: None,
            source: source.to_string(),
            event_type: event_type.to_string(),
            payload,
            status: DeliveryStatus::Skipped,
        }
    }
}

/// Result of one HTTP attempt, applied to a pending delivery.
#[derive(Debug, Clone, Default)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub status_code: Option<i32>,
    pub response: Option<String>,
    pub error_message: Option<String>,
    /// Earliest time the sweep may retry a failure.
    pub next_attempt_at: Option<Timestamp>,
}

impl DeliveryOutcome {
    pub fn status(&self) -> DeliveryStatus {
        if self.success {
            DeliveryStatus::Success
        } else {
            DeliveryStatus::Failed
        }
    }
}

/// Filter for listing deliveries.
#[derive(Debug, Clone)]
pub struct DeliveryFilter {
    pub subscription_id: Option<DbId>,
    pub status: Option<DeliveryStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for DeliveryFilter {
    fn default() -> Self {
        Self {
            subscription_id: None,
            status: None,
            limit: 50,
            offset: 0,
        }
    }
}
