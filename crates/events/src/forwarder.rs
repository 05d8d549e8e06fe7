//! Bridge from the in-process [`EventBus`](crate::bus::EventBus) to webhooks.
//!
//! [`EventForwarder`] subscribes to the bus and routes every
//! [`DomainEvent`] through the same pipeline as inbound webhooks, tagged with
//! the `internal` source. Ledger records are written inline; the HTTP
//! fan-out runs on tracked tasks so a slow subscriber never holds up the
//! receive loop. On shutdown (bus sender dropped) in-flight sends are drained.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;
use vrtrust_core::normalizer::{canonical_event_type, NormalizedEvent, INTERNAL_SOURCE, UNKNOWN_EVENT_TYPE};

use crate::bus::DomainEvent;
use crate::pipeline::EventPipeline;

/// Background service that delivers platform events to subscribers.
pub struct EventForwarder;

impl EventForwarder {
    /// Run the forwarding loop until the channel is closed, then wait for
    /// outstanding deliveries.
    pub async fn run(pipeline: Arc<EventPipeline>, mut receiver: broadcast::Receiver<DomainEvent>) {
        let in_flight = TaskTracker::new();

        loop {
            match receiver.recv().await {
                Ok(event) => Self::forward(&pipeline, &in_flight, &event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event forwarder lagged, some events were not delivered"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(
                        in_flight = in_flight.len(),
                        "Event bus closed, forwarder draining deliveries"
                    );
                    break;
                }
            }
        }

        in_flight.close();
        in_flight.wait().await;
    }

    async fn forward(pipeline: &Arc<EventPipeline>, in_flight: &TaskTracker, event: &DomainEvent) {
        let normalized = pipeline.classifier().classify_event(Self::normalize(event));
        let dispatch = match pipeline.dispatch(normalized).await {
            Ok(dispatch) => dispatch,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    event_type = %event.event_type,
                    "Failed to forward platform event"
                );
                return;
            }
        };
        if dispatch.planned.is_empty() {
            return;
        }
        let pipeline = Arc::clone(pipeline);
        in_flight.spawn(async move {
            pipeline.deliver(dispatch.planned).await;
        });
    }

    /// Map a platform event onto the canonical event model.
    pub fn normalize(event: &DomainEvent) -> NormalizedEvent {
        let event_type = canonical_event_type(&event.event_type)
            .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string());
        let mut normalized =
            NormalizedEvent::new(INTERNAL_SOURCE, event_type, event.payload_with_subject());
        normalized.timestamp = event.timestamp;
        normalized
    }
}
