//! Inbound webhook ingestion.
//!
//! Any external system may POST arbitrary JSON to `/api/universal-webhook/{source}`
//! (or `/api/webhook/{source}`). The event is normalized, classified, and
//! recorded against every matching subscription before the handler answers
//! `202`; the actual HTTP fan-out runs on a spawned task.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use vrtrust_core::error::CoreError;
use vrtrust_core::normalizer::canonical_source;
use vrtrust_core::signing::{verify_bytes, SIGNATURE_HEADER};
use vrtrust_core::types::{DbId, HeaderPairs};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of a `202 Accepted` ingestion response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// First ledger record created for the event.
    pub delivery_id: DbId,
    /// Every record created, one per matching subscription.
    pub delivery_ids: Vec<DbId>,
    /// `queued` or `skipped`.
    pub status: &'static str,
    pub event_type: String,
}

/// POST /api/universal-webhook/{source}
/// POST /api/webhook/{source}
pub async fn ingest_webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let source = canonical_source(&source)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid webhook source '{source}'")))?;

    verify_inbound_signature(&state, &source, &headers, &body)?;

    let header_pairs = header_pairs(&headers);
    let payload = parse_body(&body);

    let dispatch = state
        .pipeline
        .ingest(&source, &header_pairs, &payload)
        .await?;
    let delivery_ids = dispatch.delivery_ids();
    let delivery_id = delivery_ids
        .first()
        .copied()
        .ok_or_else(|| AppError::InternalError("Dispatch created no delivery record".into()))?;

    let response = IngestResponse {
        delivery_id,
        delivery_ids,
        status: dispatch.status(),
        event_type: dispatch.event.event_type.clone(),
    };

    tracing::info!(
        source = %source,
        event_type = %response.event_type,
        delivery_id,
        status = response.status,
        "Inbound webhook accepted"
    );

    if !dispatch.planned.is_empty() {
        let pipeline = state.pipeline.clone();
        tokio::spawn(async move {
            pipeline.deliver(dispatch.planned).await;
        });
    }

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /api/universal-webhook
pub async fn missing_source() -> AppError {
    AppError::BadRequest("Webhook source is required".into())
}

/// Check the inbound signature for `source`.
///
/// With a configured secret the signature header must be present and valid.
/// A signature without a configured secret cannot be verified and is rejected.
/// Neither the expected value nor the secret ever appears in errors or logs.
fn verify_inbound_signature(
    state: &AppState,
    source: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<()> {
    let header_name = state
        .pipeline
        .normalizers()
        .signature_header(source)
        .unwrap_or(SIGNATURE_HEADER);
    let provided = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (state.inbound_secrets.get(source), provided) {
        (Some(secret), Some(signature)) => {
            if verify_bytes(body, signature, secret) {
                Ok(())
            } else {
                tracing::warn!(source = %source, "Rejected inbound webhook with invalid signature");
                Err(unauthorized())
            }
        }
        (Some(_), None) => {
            tracing::warn!(source = %source, header = %header_name, "Rejected unsigned inbound webhook");
            Err(unauthorized())
        }
        (None, Some(_)) => {
            tracing::warn!(
                source = %source,
                "Rejected signed inbound webhook: no secret configured for source"
            );
            Err(unauthorized())
        }
        (None, None) => Ok(()),
    }
}

fn unauthorized() -> AppError {
    AppError::Core(CoreError::Unauthorized(
        "Webhook signature verification failed".into(),
    ))
}

/// Request headers as lower-cased name/value pairs; non-UTF-8 values are dropped.
fn header_pairs(headers: &HeaderMap) -> HeaderPairs {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Parse the body as JSON. Empty bodies become `{}`; anything unparsable is
/// kept as a string so the event is still recorded.
fn parse_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Default::default());
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_an_empty_object() {
        assert_eq!(parse_body(b"  "), serde_json::json!({}));
    }

    #[test]
    fn malformed_body_is_kept_as_text() {
        assert_eq!(parse_body(b"{not json"), Value::String("{not json".into()));
    }

    #[test]
    fn header_pairs_are_lower_cased() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Notion-Event-Type", "page_changed".parse().unwrap());
        let pairs = header_pairs(&headers);
        assert_eq!(pairs.get("x-notion-event-type").map(String::as_str), Some("page_changed"));
    }
}
