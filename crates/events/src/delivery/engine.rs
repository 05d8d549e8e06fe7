//! Delivery engine: sign, send, record, and retry.
//!
//! Every attempt goes through [`DeliveryEngine::attempt`], which writes the
//! outcome to the ledger with an atomic `attempts` increment. Failed
//! deliveries are re-driven by [`DeliveryEngine::sweep_once`], which the
//! [`RetrySweeper`] runs on a fixed interval until stopped. The same sweep
//! re-sends `pending` rows whose attempt was lost, so every delivery ends in
//! `success` or in `failed` with its attempts used up.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vrtrust_core::delivery::{retry_delay_secs, DeliveryStatus, DEFAULT_MAX_RETRIES};
use vrtrust_core::error::CoreError;
use vrtrust_core::signing::{canonical_bytes, sign_bytes};
use vrtrust_core::types::DbId;
use vrtrust_db::ledger::{DeliveryLedger, LedgerError};
use vrtrust_db::models::webhook::{DeliveryOutcome, WebhookDelivery, WebhookSubscription};

use super::sender::{OutboundRequest, SendError, WebhookSender, DEFAULT_TIMEOUT};

/// Default interval between retry sweeps (15 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(900);

/// Default maximum number of deliveries re-driven per sweep.
pub const DEFAULT_SWEEP_BATCH: i64 = 100;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Attempts after which a failed delivery is terminal.
    pub max_retries: i32,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    pub sweep_batch: i64,
    /// A `pending` row older than this is considered stranded and re-sent.
    pub stale_after: Duration,
    /// Backoff base; the delay after `n` attempts is `base * 2^n` seconds.
    pub backoff_base_secs: i64,
    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweep_batch: DEFAULT_SWEEP_BATCH,
            stale_after: DEFAULT_TIMEOUT * 2,
            backoff_base_secs: 1,
            user_agent: format!("vrtrust-webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// SweepReport
// ---------------------------------------------------------------------------

/// What one retry sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Deliveries found due for retry.
    pub due: usize,
    /// Deliveries actually re-sent (claims can lose races).
    pub attempted: usize,
    pub succeeded: usize,
    /// Stranded `pending` deliveries re-sent.
    pub recovered: usize,
    /// Rows skipped because of a ledger error; they are picked up again by
    /// a later sweep.
    pub errors: usize,
}

// ---------------------------------------------------------------------------
// DeliveryEngine
// ---------------------------------------------------------------------------

pub struct DeliveryEngine {
    ledger: Arc<dyn DeliveryLedger>,
    sender: WebhookSender,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    pub fn new(ledger: Arc<dyn DeliveryLedger>, config: DeliveryConfig) -> Result<Self, EngineError> {
        let sender = WebhookSender::new(config.request_timeout, &config.user_agent)?;
        Ok(Self {
            ledger,
            sender,
            config,
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn DeliveryLedger> {
        &self.ledger
    }

    /// Send a `pending` delivery to its subscription and record the outcome.
    ///
    /// Transport failures are recorded, not returned. Returns `None` if the
    /// record was no longer pending when the outcome was written.
    pub async fn attempt(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
    ) -> Result<Option<WebhookDelivery>, EngineError> {
        let body = canonical_bytes(&delivery.payload)?;
        let signature = sign_bytes(&body, &subscription.secret);
        let request = OutboundRequest {
            url: &subscription.url,
            delivery_id: delivery.id,
            event_type: &delivery.event_type,
            body,
            signature,
            extra_headers: &subscription.headers,
        };

        let outcome = match self.sender.send(&request).await {
            Ok(response) => {
                tracing::info!(
                    delivery_id = delivery.id,
                    subscription_id = subscription.id,
                    status = response.status,
                    "Webhook delivered"
                );
                DeliveryOutcome {
                    success: true,
                    status_code: Some(i32::from(response.status)),
                    response: Some(response.body),
                    error_message: None,
                    next_attempt_at: None,
                }
            }
            Err(e) => self.failure_outcome(delivery, subscription, &e),
        };

        Ok(self.ledger.record_attempt(delivery.id, &outcome).await?)
    }

    fn failure_outcome(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        err: &SendError,
    ) -> DeliveryOutcome {
        let attempts = delivery.attempts + 1;
        let delay = retry_delay_secs(attempts, self.config.backoff_base_secs);
        let exhausted = attempts >= self.config.max_retries;
        if exhausted {
            tracing::error!(
                delivery_id = delivery.id,
                subscription_id = subscription.id,
                attempts,
                error = %err,
                "Webhook delivery failed permanently"
            );
        } else {
            tracing::warn!(
                delivery_id = delivery.id,
                subscription_id = subscription.id,
                attempts,
                retry_in_secs = delay,
                error = %err,
                "Webhook delivery attempt failed"
            );
        }
        DeliveryOutcome {
            success: false,
            status_code: err.status_code().map(i32::from),
            response: err.response_body().map(str::to_string),
            error_message: Some(err.to_string()),
            next_attempt_at: (!exhausted)
                .then(|| Utc::now() + chrono::Duration::seconds(delay)),
        }
    }

    /// Re-drive one failed delivery now, ignoring its backoff.
    ///
    /// Returns `None` when the delivery cannot be retried (missing, not
    /// failed, or out of attempts).
    pub async fn retry(&self, delivery_id: DbId) -> Result<Option<WebhookDelivery>, EngineError> {
        let Some(claimed) = self
            .ledger
            .claim_for_retry(delivery_id, self.config.max_retries)
            .await?
        else {
            return Ok(None);
        };
        self.resend_claimed(claimed).await
    }

    async fn resend_claimed(
        &self,
        claimed: WebhookDelivery,
    ) -> Result<Option<WebhookDelivery>, EngineError> {
        let subscription = match claimed.subscription_id {
            Some(id) => self.ledger.get_subscription(id).await?,
            None => None,
        };
        match subscription {
            Some(subscription) => self.attempt(&claimed, &subscription).await,
            None => {
                // Deleted between listing and claiming; burn the attempt.
                let outcome = DeliveryOutcome {
                    success: false,
                    error_message: Some("Subscription no longer exists".to_string()),
                    ..Default::default()
                };
                Ok(self.ledger.record_attempt(claimed.id, &outcome).await?)
            }
        }
    }

    /// Re-send every failed delivery that has attempts left and whose
    /// backoff has elapsed, then every stranded `pending` delivery.
    ///
    /// Only the initial listings can fail the sweep; a ledger error on one
    /// row is logged and the rest of the batch continues.
    pub async fn sweep_once(&self) -> Result<SweepReport, EngineError> {
        let now = Utc::now();
        let batch = self.config.sweep_batch;
        let mut report = SweepReport::default();

        let due = self
            .ledger
            .list_retryable(self.config.max_retries, now, batch)
            .await?;
        report.due = due.len();
        for delivery in due {
            let claimed = self
                .ledger
                .claim_for_retry(delivery.id, self.config.max_retries)
                .await;
            if let Some(claimed) = Self::claimed_or_log(delivery.id, claimed, &mut report) {
                report.attempted += 1;
                self.resend_and_tally(claimed, &mut report).await;
            }
        }

        let stale_before = now
            - chrono::Duration::from_std(self.config.stale_after)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let stranded = self.ledger.list_stranded(stale_before, batch).await?;
        for delivery in stranded {
            let claimed = self.ledger.claim_stranded(delivery.id, stale_before).await;
            if let Some(claimed) = Self::claimed_or_log(delivery.id, claimed, &mut report) {
                tracing::warn!(
                    delivery_id = claimed.id,
                    attempts = claimed.attempts,
                    "Re-sending stranded pending delivery"
                );
                report.recovered += 1;
                self.resend_and_tally(claimed, &mut report).await;
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                due = report.due,
                attempted = report.attempted,
                recovered = report.recovered,
                succeeded = report.succeeded,
                errors = report.errors,
                "Retry sweep finished"
            );
        }
        Ok(report)
    }

    fn claimed_or_log(
        delivery_id: DbId,
        claimed: Result<Option<WebhookDelivery>, LedgerError>,
        report: &mut SweepReport,
    ) -> Option<WebhookDelivery> {
        match claimed {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(delivery_id, error = %e, "Failed to claim delivery for retry");
                report.errors += 1;
                None
            }
        }
    }

    async fn resend_and_tally(&self, claimed: WebhookDelivery, report: &mut SweepReport) {
        let delivery_id = claimed.id;
        match self.resend_claimed(claimed).await {
            Ok(Some(updated)) if updated.status == DeliveryStatus::Success => {
                report.succeeded += 1;
            }
            Ok(_) => {}
            Err(e) => {
                // The row stays pending and is recovered once it goes stale.
                tracing::error!(delivery_id, error = %e, "Failed to record retried delivery");
                report.errors += 1;
            }
        }
    }

    /// Spawn the periodic retry sweep. A zero `sweep_interval` disables it.
    pub fn start_sweeper(self: &Arc<Self>) -> RetrySweeper {
        let cancel = CancellationToken::new();
        let engine = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { engine.run_sweeps(token).await });
        RetrySweeper { cancel, handle }
    }

    async fn run_sweeps(&self, cancel: CancellationToken) {
        if self.config.sweep_interval.is_zero() {
            tracing::info!("Retry sweep disabled");
            return;
        }

        let mut interval = tokio::time::interval(self.config.sweep_interval);
        // The first tick fires immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retry sweeper cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Retry sweep failed");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RetrySweeper
// ---------------------------------------------------------------------------

/// Handle to the running sweep task.
pub struct RetrySweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RetrySweeper {
    /// Stop the sweeper and wait for an in-flight sweep to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Retry sweeper task panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vrtrust_db::ledger::MemoryLedger;

    #[test]
    fn default_config_matches_documented_values() {
        let config = DeliveryConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.sweep_interval, Duration::from_secs(900));
        assert!(config.user_agent.starts_with("vrtrust-webhooks/"));
    }

    #[tokio::test]
    async fn sweeper_starts_and_stops() {
        let engine = Arc::new(
            DeliveryEngine::new(Arc::new(MemoryLedger::new()), DeliveryConfig::default()).unwrap(),
        );
        let sweeper = engine.start_sweeper();
        assert!(sweeper.is_running());
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn zero_interval_disables_sweeper() {
        let config = DeliveryConfig {
            sweep_interval: Duration::ZERO,
            ..Default::default()
        };
        let engine = Arc::new(DeliveryEngine::new(Arc::new(MemoryLedger::new()), config).unwrap());
        let sweeper = engine.start_sweeper();
        tokio::time::timeout(Duration::from_secs(1), sweeper.stop())
            .await
            .expect("disabled sweeper exits immediately");
    }

    #[tokio::test]
    async fn retry_of_unknown_delivery_is_none() {
        let engine =
            DeliveryEngine::new(Arc::new(MemoryLedger::new()), DeliveryConfig::default()).unwrap();
        assert!(engine.retry(42).await.unwrap().is_none());
    }
}
