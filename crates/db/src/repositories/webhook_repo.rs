//! Repository for the `webhook_subscriptions` and `webhook_deliveries` tables.

use sqlx::types::Json;
use sqlx::PgPool;
use vrtrust_core::delivery::DeliveryStatus;
use vrtrust_core::subscriptions::WILDCARD_EVENT;
use vrtrust_core::types::{DbId, Timestamp};

use crate::models::webhook::{
    CreateSubscription, DeliveryFilter, DeliveryOutcome, NewDelivery, UpdateSubscription,
    WebhookDelivery, WebhookSubscription,
};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const SUBSCRIPTION_COLUMNS: &str = "\
    id, name, url, secret, events, is_active, headers, partner_id, \
    created_at, updated_at";

const DELIVERY_COLUMNS: &str = "\
    id, subscription_id, source, event_type, payload, status, status_code, \
    response, error_message, attempts, next_attempt_at, pending_since, created_at, \
    processed_at";

/// Provides CRUD operations for subscriptions and the delivery ledger.
pub struct WebhookRepo;

impl WebhookRepo {
    // -----------------------------------------------------------------------
    // Subscription CRUD
    // -----------------------------------------------------------------------

    /// Create a new subscription. `secret` is the already-resolved secret.
    pub async fn create(
        pool: &PgPool,
        input: &CreateSubscription,
        secret: &str,
    ) -> Result<WebhookSubscription, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_subscriptions \
                 (name, url, secret, events, is_active, headers, partner_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookSubscription>(&query)
            .bind(&input.name)
            .bind(input.url.trim())
            .bind(secret)
            .bind(Json(&input.events))
            .bind(input.is_active.unwrap_or(true))
            .bind(Json(&input.headers))
            .bind(input.partner_id)
            .fetch_one(pool)
            .await
    }

    /// List all subscriptions ordered by creation date (newest first).
    pub async fn list(pool: &PgPool) -> Result<Vec<WebhookSubscription>, sqlx::Error> {
        let query = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, WebhookSubscription>(&query)
            .fetch_all(pool)
            .await
    }

    /// Find a subscription by ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WebhookSubscription>, sqlx::Error> {
        let query = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions WHERE id = $1");
        sqlx::query_as::<_, WebhookSubscription>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active subscriptions listing `event_type` or the wildcard.
    pub async fn find_matching(
        pool: &PgPool,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, sqlx::Error> {
        let query = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions \
             WHERE is_active AND (events ? $1 OR events ? $2) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, WebhookSubscription>(&query)
            .bind(event_type)
            .bind(WILDCARD_EVENT)
            .fetch_all(pool)
            .await
    }

    /// Update a subscription's settings. Absent fields keep their value;
    /// `partner_id` can also be cleared with an explicit `null`.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateSubscription,
    ) -> Result<Option<WebhookSubscription>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_subscriptions SET \
                 name = COALESCE($2, name), \
                 url = COALESCE($3, url), \
                 secret = COALESCE($4, secret), \
                 events = COALESCE($5, events), \
                 is_active = COALESCE($6, is_active), \
                 headers = COALESCE($7, headers), \
                 partner_id = CASE WHEN $8 THEN $9 ELSE partner_id END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookSubscription>(&query)
            .bind(id)
            .bind(input.name.as_deref())
            .bind(input.url.as_deref().map(str::trim))
            .bind(input.secret.as_deref())
            .bind(input.events.as_ref().map(Json))
            .bind(input.is_active)
            .bind(input.headers.as_ref().map(Json))
            .bind(input.partner_id.is_some())
            .bind(input.partner_id.flatten())
            .fetch_optional(pool)
            .await
    }

    /// Delete a subscription by ID. Its deliveries keep their history with a
    /// `NULL` subscription reference.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhook_subscriptions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Delivery ledger
    // -----------------------------------------------------------------------

    /// Insert a delivery record.
    pub async fn create_delivery(
        pool: &PgPool,
        input: &NewDelivery,
    ) -> Result<WebhookDelivery, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_deliveries \
                 (subscription_id, source, event_type, payload, status, pending_since, \
                  processed_at) \
             VALUES ($1, $2, $3, $4, $5, \
                     CASE WHEN $5 = 'pending' THEN NOW() END, \
                     CASE WHEN $5 = 'skipped' THEN NOW() END) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(input.subscription_id)
            .bind(&input.source)
            .bind(&input.event_type)
            .bind(&input.payload)
            .bind(input.status.as_str())
            .fetch_one(pool)
            .await
    }

    /// Find a delivery by ID.
    pub async fn find_delivery_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1");
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List deliveries newest first, optionally filtered.
    pub async fn list_deliveries(
        pool: &PgPool,
        filter: &DeliveryFilter,
    ) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE ($1::BIGINT IS NULL OR subscription_id = $1) \
               AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(filter.subscription_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await
    }

    /// Apply an attempt outcome to a pending delivery.
    ///
    /// `attempts` is incremented in the same statement so concurrent writers
    /// cannot lose an increment. Rows not in `pending` are left alone and
    /// `None` is returned.
    pub async fn record_attempt(
        pool: &PgPool,
        id: DbId,
        outcome: &DeliveryOutcome,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_deliveries SET \
                 status = $2, \
                 status_code = $3, \
                 response = $4, \
                 error_message = $5, \
                 next_attempt_at = $6, \
                 attempts = attempts + 1, \
                 pending_since = NULL, \
                 processed_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(id)
            .bind(outcome.status().as_str())
            .bind(outcome.status_code)
            .bind(outcome.response.as_deref())
            .bind(outcome.error_message.as_deref())
            .bind(if outcome.success { None } else { outcome.next_attempt_at })
            .fetch_optional(pool)
            .await
    }

    /// Move a failed delivery with attempts left back to `pending`.
    ///
    /// Returns `None` when the row is missing, not failed, or exhausted, so
    /// two sweeps can never claim the same retry.
    pub async fn claim_for_retry(
        pool: &PgPool,
        id: DbId,
        max_retries: i32,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_deliveries SET status = '{pending}', pending_since = NOW() \
             WHERE id = $1 AND status = '{failed}' AND attempts < $2 \
               AND subscription_id IS NOT NULL \
             RETURNING {DELIVERY_COLUMNS}",
            pending = DeliveryStatus::Pending.as_str(),
            failed = DeliveryStatus::Failed.as_str(),
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(id)
            .bind(max_retries)
            .fetch_optional(pool)
            .await
    }

    /// Failed deliveries with attempts left whose backoff has elapsed,
    /// oldest first.
    pub async fn list_retryable(
        pool: &PgPool,
        max_retries: i32,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE status = 'failed' \
               AND attempts < $1 \
               AND subscription_id IS NOT NULL \
               AND (next_attempt_at IS NULL OR next_attempt_at <= $2) \
             ORDER BY created_at ASC, id ASC LIMIT $3"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(max_retries)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Pending deliveries whose attempt was lost: they entered `pending`
    /// before `stale_before` and no outcome was ever recorded.
    pub async fn list_stranded(
        pool: &PgPool,
        stale_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE status = 'pending' AND pending_since < $1 \
             ORDER BY pending_since ASC, id ASC LIMIT $2"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(stale_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Restart the clock on a stranded delivery. Only one caller can win a
    /// given row; everyone else gets `None`.
    pub async fn claim_stranded(
        pool: &PgPool,
        id: DbId,
        stale_before: Timestamp,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_deliveries SET pending_since = NOW() \
             WHERE id = $1 AND status = 'pending' AND pending_since < $2 \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(id)
            .bind(stale_before)
            .fetch_optional(pool)
            .await
    }
}
