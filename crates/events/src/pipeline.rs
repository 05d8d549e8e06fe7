//! The event pipeline: normalize, classify, match, redact, record, deliver.
//!
//! [`EventPipeline::dispatch`] writes one ledger record per matching
//! subscription (or a single `skipped` record) before anything is sent, so
//! callers can report delivery ids immediately. [`EventPipeline::deliver`]
//! then fans out concurrently; one subscriber failing or hanging never
//! affects another.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use vrtrust_core::classifier::EventClassifier;
use vrtrust_core::normalizer::{NormalizedEvent, NormalizerRegistry, INTERNAL_SOURCE};
use vrtrust_core::redaction::{redact, subject_user_id, TrustTier};
use vrtrust_core::trust::TrustScoreProvider;
use vrtrust_core::types::{DbId, HeaderPairs};
use vrtrust_db::ledger::DeliveryLedger;
use vrtrust_db::models::webhook::{NewDelivery, WebhookDelivery, WebhookSubscription};

use crate::delivery::engine::{DeliveryEngine, EngineError};

/// Event type of synthesized test deliveries.
pub const TEST_EVENT_TYPE: &str = "webhook.test";

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// A recorded delivery waiting to be sent.
#[derive(Debug, Clone)]
pub struct PlannedDelivery {
    pub delivery: WebhookDelivery,
    pub subscription: WebhookSubscription,
}

/// The ledger records created for one event.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub event: NormalizedEvent,
    pub planned: Vec<PlannedDelivery>,
    /// Present when no subscription matched.
    pub skipped: Option<WebhookDelivery>,
}

impl Dispatch {
    /// Ids of every record created, in creation order.
    pub fn delivery_ids(&self) -> Vec<DbId> {
        match &self.skipped {
            Some(skipped) => vec![skipped.id],
            None => self.planned.iter().map(|p| p.delivery.id).collect(),
        }
    }

    /// `"skipped"` when nobody subscribed, otherwise `"queued"`.
    pub fn status(&self) -> &'static str {
        if self.skipped.is_some() {
            "skipped"
        } else {
            "queued"
        }
    }
}

// ---------------------------------------------------------------------------
// EventPipeline
// ---------------------------------------------------------------------------

pub struct EventPipeline {
    normalizers: Arc<NormalizerRegistry>,
    classifier: Arc<EventClassifier>,
    ledger: Arc<dyn DeliveryLedger>,
    trust: Arc<dyn TrustScoreProvider>,
    engine: Arc<DeliveryEngine>,
}

impl EventPipeline {
    pub fn new(
        normalizers: Arc<NormalizerRegistry>,
        classifier: Arc<EventClassifier>,
        trust: Arc<dyn TrustScoreProvider>,
        engine: Arc<DeliveryEngine>,
    ) -> Self {
        Self {
            normalizers,
            classifier,
            ledger: Arc::clone(engine.ledger()),
            trust,
            engine,
        }
    }

    pub fn normalizers(&self) -> &NormalizerRegistry {
        &self.normalizers
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn ledger(&self) -> &Arc<dyn DeliveryLedger> {
        &self.ledger
    }

    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.engine
    }

    /// Normalize and classify an inbound webhook. Never fails.
    pub fn prepare(&self, source: &str, headers: &HeaderPairs, body: &Value) -> NormalizedEvent {
        let event = self.normalizers.normalize(source, headers, body);
        self.classifier.classify_event(event)
    }

    /// Normalize, classify, and record an inbound webhook without sending.
    pub async fn ingest(
        &self,
        source: &str,
        headers: &HeaderPairs,
        body: &Value,
    ) -> Result<Dispatch, EngineError> {
        let event = self.prepare(source, headers, body);
        self.dispatch(event).await
    }

    /// Match subscriptions and create one pending record per subscriber, each
    /// holding the redacted outbound body.
    pub async fn dispatch(&self, event: NormalizedEvent) -> Result<Dispatch, EngineError> {
        let subscriptions = self.ledger.find_matching(&event.event_type).await?;

        if subscriptions.is_empty() {
            let body = envelope(&event, redact(&event.payload, None));
            let skipped = self
                .ledger
                .create_delivery(&NewDelivery::skipped(&event.source, &event.event_type, body))
                .await?;
            tracing::debug!(
                source = %event.source,
                event_type = %event.event_type,
                delivery_id = skipped.id,
                "No subscription matched; recorded as skipped"
            );
            return Ok(Dispatch {
                event,
                planned: Vec::new(),
                skipped: Some(skipped),
            });
        }

        let trust_level = self.trust_level_for(&event.payload).await;
        let body = envelope(&event, redact(&event.payload, trust_level));

        let mut planned = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let delivery = self
                .ledger
                .create_delivery(&NewDelivery::pending(
                    subscription.id,
                    &event.source,
                    &event.event_type,
                    body.clone(),
                ))
                .await?;
            planned.push(PlannedDelivery {
                delivery,
                subscription,
            });
        }

        tracing::info!(
            source = %event.source,
            event_type = %event.event_type,
            deliveries = planned.len(),
            trust_tier = %TrustTier::from_level(trust_level),
            "Event dispatched"
        );
        Ok(Dispatch {
            event,
            planned,
            skipped: None,
        })
    }

    /// Send every planned delivery concurrently and wait for all of them.
    ///
    /// Returns the final ledger state of each record that was written.
    pub async fn deliver(&self, planned: Vec<PlannedDelivery>) -> Vec<WebhookDelivery> {
        let attempts = planned.iter().map(|p| async move {
            match self.engine.attempt(&p.delivery, &p.subscription).await {
                Ok(updated) => updated,
                Err(e) => {
                    tracing::error!(
                        delivery_id = p.delivery.id,
                        error = %e,
                        "Failed to record delivery attempt"
                    );
                    None
                }
            }
        });
        join_all(attempts).await.into_iter().flatten().collect()
    }

    /// Send a synthesized test event to one subscription, regardless of its
    /// event filter or active flag. Returns `None` if it does not exist.
    pub async fn send_test(
        &self,
        subscription_id: DbId,
    ) -> Result<Option<WebhookDelivery>, EngineError> {
        let Some(subscription) = self.ledger.get_subscription(subscription_id).await? else {
            return Ok(None);
        };

        let event = self.classifier.classify_event(NormalizedEvent::new(
            INTERNAL_SOURCE,
            TEST_EVENT_TYPE,
            json!({
                "message": "Test delivery",
                "subscriptionId": subscription.id,
                "timestamp": chrono::Utc::now(),
            }),
        ));
        let body = envelope(&event, redact(&event.payload, None));
        let delivery = self
            .ledger
            .create_delivery(&NewDelivery::pending(
                subscription.id,
                &event.source,
                &event.event_type,
                body,
            ))
            .await?;

        let result = self.engine.attempt(&delivery, &subscription).await?;
        Ok(Some(match result {
            Some(updated) => updated,
            None => delivery,
        }))
    }

    async fn trust_level_for(&self, payload: &Value) -> Option<u32> {
        let user_id = subject_user_id(payload)?;
        self.trust.trust_level(user_id).await
    }
}

/// The JSON body sent to subscribers.
pub fn envelope(event: &NormalizedEvent, data: Value) -> Value {
    json!({
        "id": event.id,
        "source": event.source,
        "eventType": event.event_type,
        "timestamp": event.timestamp,
        "data": data,
        "intelligence": event.intelligence,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vrtrust_core::normalizer::UNKNOWN_EVENT_TYPE;

    #[test]
    fn envelope_carries_event_metadata() {
        let event = NormalizedEvent::new("github", "github.push", json!({ "ref": "main" }));
        let body = envelope(&event, json!({ "ref": "main" }));
        assert_eq!(body["source"], "github");
        assert_eq!(body["eventType"], "github.push");
        assert_eq!(body["data"]["ref"], "main");
        assert_eq!(body["id"], event.id.to_string());
        assert!(body["intelligence"].is_null());
    }

    #[test]
    fn dispatch_without_skipped_record_is_queued() {
        let event = NormalizedEvent::new("x", UNKNOWN_EVENT_TYPE, json!({}));
        let dispatch = Dispatch {
            event,
            planned: Vec::new(),
            skipped: None,
        };
        assert_eq!(dispatch.status(), "queued");
        assert!(dispatch.delivery_ids().is_empty());
    }
}
