use std::sync::Arc;

use vrtrust_core::classifier::EventClassifier;
use vrtrust_core::normalizer::NormalizerRegistry;
use vrtrust_core::trust::TrustScoreProvider;
use vrtrust_db::ledger::DeliveryLedger;
use vrtrust_events::{DeliveryConfig, DeliveryEngine, EngineError, EventBus, EventPipeline};

use crate::config::{InboundSecrets, ServerConfig};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Normalize, classify, record, and deliver.
    pub pipeline: Arc<EventPipeline>,
    pub config: Arc<ServerConfig>,
    /// Secrets for verifying inbound webhook signatures.
    pub inbound_secrets: Arc<InboundSecrets>,
    /// Platform event bus; forwarded to subscribers.
    pub event_bus: Arc<EventBus>,
}

impl AppState {
    /// Wire the pipeline with the built-in source adapters and default
    /// classification rules.
    pub fn build(
        ledger: Arc<dyn DeliveryLedger>,
        trust: Arc<dyn TrustScoreProvider>,
        delivery: DeliveryConfig,
        config: ServerConfig,
        inbound_secrets: InboundSecrets,
    ) -> Result<Self, EngineError> {
        let engine = Arc::new(DeliveryEngine::new(ledger, delivery)?);
        let pipeline = EventPipeline::new(
            Arc::new(NormalizerRegistry::with_builtin_sources()),
            Arc::new(EventClassifier::with_default_rules()),
            trust,
            engine,
        );
        Ok(Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            inbound_secrets: Arc::new(inbound_secrets),
            event_bus: Arc::new(EventBus::default()),
        })
    }

    pub fn ledger(&self) -> &Arc<dyn DeliveryLedger> {
        self.pipeline.ledger()
    }
}
