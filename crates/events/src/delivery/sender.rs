//! Single signed HTTP POST to a subscriber endpoint.
//!
//! [`WebhookSender`] owns a pooled `reqwest` client with a fixed request
//! timeout. It never retries; the [`DeliveryEngine`](super::engine::DeliveryEngine)
//! decides what happens after a failure.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use vrtrust_core::delivery::truncate_response;
use vrtrust_core::signing::{signature_header_value, SIGNATURE_HEADER};
use vrtrust_core::types::DbId;

/// Header carrying the ledger id of the delivery.
pub const DELIVERY_ID_HEADER: &str = "X-Webhook-Delivery-Id";

/// Header carrying the canonical event type.
pub const EVENT_TYPE_HEADER: &str = "X-Webhook-Event-Type";

/// Default HTTP request timeout for a single attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Why one delivery attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other transport failure (DNS, TLS, invalid header, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The subscriber answered with a non-2xx status.
    #[error("Webhook returned HTTP {status}")]
    HttpStatus { status: u16, body: String },
}

impl SendError {
    /// HTTP status, when the subscriber answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Truncated response body, when the subscriber answered.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// OutboundRequest
// ---------------------------------------------------------------------------

/// Everything needed to POST one delivery.
#[derive(Debug)]
pub struct OutboundRequest<'a> {
    pub url: &'a str,
    pub delivery_id: DbId,
    pub event_type: &'a str,
    /// Exact bytes that were signed.
    pub body: Vec<u8>,
    /// Hex HMAC-SHA256 of `body`.
    pub signature: String,
    /// Static subscription headers. Never override the engine's own headers.
    pub extra_headers: &'a BTreeMap<String, String>,
}

/// A 2xx answer from a subscriber.
#[derive(Debug, Clone)]
pub struct SendResponse {
    pub status: u16,
    /// Truncated response body.
    pub body: String,
}

// ---------------------------------------------------------------------------
// WebhookSender
// ---------------------------------------------------------------------------

pub struct WebhookSender {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookSender {
    /// Build a sender whose requests time out after `timeout` and identify
    /// themselves with `user_agent`.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Execute a single POST and classify the result.
    pub async fn send(&self, request: &OutboundRequest<'_>) -> Result<SendResponse, SendError> {
        let headers = build_headers(request);

        let response = self
            .client
            .post(request.url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let success = response.status().is_success();
        let body = truncate_response(&response.text().await.unwrap_or_default());

        if !success {
            return Err(SendError::HttpStatus { status, body });
        }
        Ok(SendResponse { status, body })
    }

    fn classify(&self, err: reqwest::Error) -> SendError {
        if err.is_timeout() {
            SendError::Timeout(self.timeout)
        } else if err.is_connect() {
            SendError::Connect(err.to_string())
        } else {
            SendError::Request(err)
        }
    }
}

/// Engine headers plus valid static headers. Static headers that are not
/// valid HTTP are dropped with a warning rather than failing the attempt.
fn build_headers(request: &OutboundRequest<'_>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in request.extra_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(
                delivery_id = request.delivery_id,
                header = %name,
                "Dropping invalid static header"
            ),
        }
    }

    // Inserted last so static headers can never replace them.
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(v) = HeaderValue::from_str(&signature_header_value(&request.signature)) {
        headers.insert(SIGNATURE_HEADER, v);
    }
    headers.insert(DELIVERY_ID_HEADER, HeaderValue::from(request.delivery_id));
    if let Ok(v) = HeaderValue::from_str(request.event_type) {
        headers.insert(EVENT_TYPE_HEADER, v);
    }
    headers
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
