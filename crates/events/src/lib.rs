//! Event routing and webhook delivery.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub for [`DomainEvent`]s
//!   emitted by the platform itself.
//! - [`EventPipeline`] -- normalize, classify, match, redact, and record an
//!   event, then fan it out to every matching subscription.
//! - [`delivery`] -- the signed HTTP sender, the [`DeliveryEngine`] that
//!   records each attempt, and the [`RetrySweeper`] background task.
//! - [`EventForwarder`] -- feeds bus events into the pipeline.

pub mod bus;
pub mod delivery;
pub mod forwarder;
pub mod pipeline;

pub use bus::{DomainEvent, EventBus};
pub use delivery::engine::{DeliveryConfig, DeliveryEngine, EngineError, RetrySweeper, SweepReport};
pub use delivery::sender::{OutboundRequest, SendError, WebhookSender};
pub use forwarder::EventForwarder;
pub use pipeline::{Dispatch, EventPipeline, PlannedDelivery};
