//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries [`DomainEvent`]s raised by the platform itself (for
//! example a completed verification). The [`EventForwarder`](crate::EventForwarder)
//! subscribes and routes them through the same pipeline as inbound webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vrtrust_core::types::DbId;

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// An event that occurred inside the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Dot-separated event name, e.g. `"verification.verified"`.
    pub event_type: String,

    /// User the event is about. Copied into the payload as `userId` so
    /// redaction can look up their trust level.
    pub subject_user_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    /// Create an event with an empty object payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            subject_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_subject(mut self, user_id: DbId) -> Self {
        self.subject_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Payload with `userId` filled from the subject when absent.
    pub fn payload_with_subject(&self) -> serde_json::Value {
        let mut payload = self.payload.clone();
        if let (Some(user_id), Some(obj)) = (self.subject_user_id, payload.as_object_mut()) {
            obj.entry("userId").or_insert_with(|| user_id.into());
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: DomainEvent) {
        // A send error only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            DomainEvent::new("verification.verified")
                .with_subject(42)
                .with_payload(serde_json::json!({"method": "document"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "verification.verified");
        assert_eq!(received.subject_user_id, Some(42));
        assert_eq!(received.payload["method"], "document");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(DomainEvent::new("trust.score.updated"));

        assert_eq!(rx1.recv().await.unwrap().event_type, "trust.score.updated");
        assert_eq!(rx2.recv().await.unwrap().event_type, "trust.score.updated");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        EventBus::default().publish(DomainEvent::new("orphan.event"));
    }

    #[test]
    fn subject_is_copied_into_payload_without_overwriting() {
        let event = DomainEvent::new("user.updated").with_subject(7);
        assert_eq!(event.payload_with_subject()["userId"], 7);

        let explicit = DomainEvent::new("user.updated")
            .with_subject(7)
            .with_payload(serde_json::json!({"userId": 9}));
        assert_eq!(explicit.payload_with_subject()["userId"], 9);
    }
}
