#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use vrtrust_api::config::{InboundSecrets, ServerConfig};
use vrtrust_api::router::build_app_router;
use vrtrust_api::state::AppState;
use vrtrust_core::delivery::DeliveryStatus;
use vrtrust_core::trust::NoTrustScores;
use vrtrust_core::types::DbId;
use vrtrust_db::ledger::MemoryLedger;
use vrtrust_db::models::webhook::WebhookDelivery;
use vrtrust_events::DeliveryConfig;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_body_bytes: 64 * 1024,
        log_json: false,
    }
}

/// Delivery settings with no backoff and a short timeout.
pub fn test_delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        backoff_base_secs: 0,
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Application state over a fresh in-memory ledger.
pub fn build_test_state(inbound_secrets: InboundSecrets) -> AppState {
    AppState::build(
        Arc::new(MemoryLedger::new()),
        Arc::new(NoTrustScores),
        test_delivery_config(),
        test_config(),
        inbound_secrets,
    )
    .unwrap()
}

/// Build the full application router (same middleware stack as production)
/// and return the state alongside it for direct ledger assertions.
pub fn build_test_app() -> (Router, AppState) {
    build_test_app_with_secrets(InboundSecrets::default())
}

pub fn build_test_app_with_secrets(secrets: InboundSecrets) -> (Router, AppState) {
    let state = build_test_state(secrets);
    let app = build_app_router(state.clone(), &test_config());
    (app, state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::POST, uri, body).await
}

pub async fn patch_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::PATCH, uri, body).await
}

async fn json_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST raw bytes with extra headers.
pub async fn post_raw(
    app: &Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::from(body)).unwrap()).await
}

/// POST a single file as `multipart/form-data`.
pub async fn post_multipart(
    app: &Router,
    uri: &str,
    field: &str,
    filename: &str,
    content: &str,
) -> Response<Body> {
    let boundary = "vrtrust-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Poll the ledger until the delivery leaves `pending`.
pub async fn wait_for_outcome(state: &AppState, id: DbId) -> WebhookDelivery {
    for _ in 0..200 {
        let delivery = state.ledger().get_delivery(id).await.unwrap().unwrap();
        if delivery.status != DeliveryStatus::Pending {
            return delivery;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("delivery {id} never left pending");
}
