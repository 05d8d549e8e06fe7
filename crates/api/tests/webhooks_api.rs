//! Integration tests for ingestion, subscription management, deliveries, and
//! CSV transfer, run against the in-memory ledger.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    body_bytes, body_json, build_test_app, build_test_app_with_secrets, delete, get, patch_json,
    post_json, post_multipart, post_raw, wait_for_outcome,
};
use vrtrust_api::config::InboundSecrets;
use vrtrust_core::delivery::DeliveryStatus;
use vrtrust_core::signing::{sign_bytes, signature_header_value};

async fn create_subscription(app: &axum::Router, body: Value) -> Value {
    let response = post_json(app, "/api/webhooks", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscription_lifecycle() {
    let (app, _state) = build_test_app();

    let created = create_subscription(
        &app,
        json!({
            "name": "Partner",
            "url": "https://partner.example/hook",
            "events": ["verification.verified"],
            "headers": { "X-Partner": "acme" },
            "partnerId": 12
        }),
    )
    .await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["isActive"], true);
    assert_eq!(created["partnerId"], 12);
    assert_eq!(created["secret"].as_str().unwrap().len(), 64);

    let listed = body_json(get(&app, "/api/webhook").await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let response = patch_json(&app, &format!("/api/webhook/{id}"), json!({ "isActive": false })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["data"]["isActive"], false);
    assert_eq!(updated["data"]["url"], "https://partner.example/hook");
    assert_eq!(updated["data"]["partnerId"], 12);

    let response = patch_json(&app, &format!("/api/webhook/{id}"), json!({ "partnerId": null })).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["data"]["partnerId"].is_null());

    let fetched = body_json(get(&app, &format!("/api/webhook/{id}")).await).await;
    assert_eq!(fetched["data"]["isActive"], false);

    assert_eq!(
        delete(&app, &format!("/api/webhook/{id}")).await.status(),
        StatusCode::NO_CONTENT
    );
    let missing = get(&app, &format!("/api/webhook/{id}")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(missing).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn invalid_subscriptions_are_rejected() {
    let (app, _state) = build_test_app();

    for body in [
        json!({ "url": "https://a.example", "events": [] }),
        json!({ "url": "ftp://a.example", "events": ["*"] }),
        json!({ "url": "https://a.example", "events": ["*"], "headers": { "X-Webhook-Signature": "x" } }),
    ] {
        let response = post_json(&app, "/api/webhook", body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    let response = patch_json(&app, "/api/webhook/999", json!({ "isActive": true })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unmatched_event_is_skipped_not_failed() {
    let (app, _state) = build_test_app();

    let response = post_raw(
        &app,
        "/api/universal-webhook/acme",
        &[],
        br#"{"eventType":"user.created","userId":5}"#.to_vec(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "skipped");
    assert_eq!(json["eventType"], "user.created");

    let id = json["deliveryId"].as_i64().unwrap();
    let delivery = body_json(get(&app, &format!("/api/webhook-delivery/{id}")).await).await;
    assert_eq!(delivery["data"]["status"], "skipped");
    assert!(delivery["data"]["subscriptionId"].is_null());
}

#[tokio::test]
async fn matching_event_is_delivered_and_signed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-webhook-event-type", "verification.verified"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (app, state) = build_test_app();
    let sub = create_subscription(
        &app,
        json!({ "url": server.uri(), "events": ["verification.verified"], "secret": "abc" }),
    )
    .await;

    let response = post_raw(
        &app,
        "/api/webhook/identity-partner",
        &[],
        br#"{"event":"verification.verified","userId":1}"#.to_vec(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "queued");
    assert_eq!(json["deliveryIds"].as_array().unwrap().len(), 1);

    let delivery = wait_for_outcome(&state, json["deliveryId"].as_i64().unwrap()).await;
    assert_eq!(delivery.status, DeliveryStatus::Success);
    assert_eq!(delivery.subscription_id, sub["id"].as_i64());

    let requests = server.received_requests().await.unwrap();
    let signature = requests[0].headers.get("x-webhook-signature").unwrap();
    assert_eq!(
        signature.to_str().unwrap(),
        signature_header_value(&sign_bytes(&requests[0].body, "abc"))
    );
}

#[tokio::test]
async fn notion_header_sets_event_type() {
    let (app, _state) = build_test_app();
    let response = post_raw(
        &app,
        "/api/universal-webhook/notion",
        &[("x-notion-event-type", "page_changed")],
        b"{}".to_vec(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["eventType"], "notion.page.changed");
}

#[tokio::test]
async fn malformed_body_is_recorded_as_unknown() {
    let (app, _state) = build_test_app();
    let response = post_raw(&app, "/api/universal-webhook/acme", &[], b"{oops".to_vec()).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["eventType"], "unknown");
    assert_eq!(json["status"], "skipped");
}

#[tokio::test]
async fn missing_or_invalid_source_is_bad_request() {
    let (app, _state) = build_test_app();

    let response = post_raw(&app, "/api/universal-webhook", &[], b"{}".to_vec()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");

    let response = post_raw(&app, "/api/universal-webhook/bad.source", &[], b"{}".to_vec()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Inbound signatures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inbound_signature_is_enforced_when_configured() {
    let secrets = InboundSecrets::default().with_secret("acme", "inbound-secret");
    let (app, _state) = build_test_app_with_secrets(secrets);
    let body = br#"{"eventType":"user.created"}"#.to_vec();
    let uri = "/api/universal-webhook/acme";

    let unsigned = post_raw(&app, uri, &[], body.clone()).await;
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    let good = signature_header_value(&sign_bytes(&body, "inbound-secret"));
    let signed = post_raw(&app, uri, &[("x-webhook-signature", good.as_str())], body.clone()).await;
    assert_eq!(signed.status(), StatusCode::ACCEPTED);

    let bad = signature_header_value(&sign_bytes(&body, "guess"));
    let forged = post_raw(&app, uri, &[("x-webhook-signature", bad.as_str())], body.clone()).await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    let text = String::from_utf8(body_bytes(forged).await).unwrap();
    assert!(!text.contains(&good));
    assert!(text.contains("UNAUTHORIZED"));
}

#[tokio::test]
async fn signature_without_configured_secret_is_rejected() {
    let (app, _state) = build_test_app();
    let body = br#"{"action":"opened"}"#.to_vec();
    let response = post_raw(
        &app,
        "/api/universal-webhook/github",
        &[("x-github-event", "pull_request"), ("x-hub-signature-256", "sha256=00")],
        body,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deliveries_filter_by_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (app, state) = build_test_app();
    let first = create_subscription(&app, json!({ "url": server.uri(), "events": ["*"] })).await;
    create_subscription(&app, json!({ "url": server.uri(), "events": ["*"] })).await;

    let response = post_raw(
        &app,
        "/api/universal-webhook/acme",
        &[],
        br#"{"type":"payment.completed"}"#.to_vec(),
    )
    .await;
    let json = body_json(response).await;
    for id in json["deliveryIds"].as_array().unwrap() {
        wait_for_outcome(&state, id.as_i64().unwrap()).await;
    }

    let all = body_json(get(&app, "/api/webhook-deliveries").await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let first_id = first["id"].as_i64().unwrap();
    let filtered = body_json(
        get(&app, &format!("/api/webhook-deliveries?subscriptionId={first_id}")).await,
    )
    .await;
    let rows = filtered["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["subscriptionId"], first_id);
    assert_eq!(rows[0]["status"], "success");

    let bad = get(&app, "/api/webhook-deliveries?status=bogus").await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_retry_redrives_failed_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (app, _state) = build_test_app();
    let sub = create_subscription(&app, json!({ "url": server.uri(), "events": ["*"] })).await;
    let sub_id = sub["id"].as_i64().unwrap();

    let tested = body_json(post_raw(&app, &format!("/api/test-webhook/{sub_id}"), &[], vec![]).await).await;
    assert_eq!(tested["data"]["status"], "failed");
    assert_eq!(tested["data"]["eventType"], "webhook.test");
    let delivery_id = tested["data"]["id"].as_i64().unwrap();

    let retry_uri = format!("/api/webhook-delivery/{delivery_id}/retry");
    let retried = post_raw(&app, &retry_uri, &[], vec![]).await;
    assert_eq!(retried.status(), StatusCode::OK);
    let retried = body_json(retried).await;
    assert_eq!(retried["data"]["status"], "success");
    assert_eq!(retried["data"]["attempts"], 2);

    let again = post_raw(&app, &retry_uri, &[], vec![]).await;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let unknown = post_raw(&app, "/api/webhook-delivery/9999/retry", &[], vec![]).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trigger_for_unknown_subscription_is_404() {
    let (app, _state) = build_test_app();
    let response = post_raw(&app, "/api/test-webhook/404", &[], vec![]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// CSV import / export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn csv_import_skips_malformed_rows() {
    let (app, _state) = build_test_app();
    let csv = "name,url,secret,events,isActive,partnerId,headers\n\
               a,https://a.example/hook,s1,user.created,true,,\n\
               b,,s2,user.created,true,,\n\
               c,https://c.example/hook,s3,\"user.created,user.deleted\",false,7,\"{\"\"X-Team\"\":\"\"c\"\"}\"\n";

    let response = post_multipart(&app, "/api/import/webhooks", "file", "subs.csv", csv).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["count"], 2);
    assert_eq!(json["data"]["skipped"][0]["line"], 3);

    let listed = body_json(get(&app, "/api/webhooks").await).await;
    let urls: Vec<&str> = listed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.contains(&"https://a.example/hook"));
    assert!(urls.contains(&"https://c.example/hook"));
}

#[tokio::test]
async fn csv_export_round_trips_through_import() {
    let (source_app, _) = build_test_app();
    create_subscription(
        &source_app,
        json!({
            "name": "Team C",
            "url": "https://c.example/hook",
            "secret": "s3",
            "events": ["user.created", "user.deleted"],
            "isActive": false,
            "partnerId": 7,
            "headers": { "X-Team": "c" }
        }),
    )
    .await;

    let response = get(&source_app, "/api/export/webhooks").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    let csv = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(csv.starts_with("name,url,secret,events,isActive,partnerId,headers"));

    let (target_app, _) = build_test_app();
    let imported = body_json(
        post_multipart(&target_app, "/api/import/webhooks", "file", "export.csv", &csv).await,
    )
    .await;
    assert_eq!(imported["data"]["count"], 1);

    let listed = body_json(get(&target_app, "/api/webhooks").await).await;
    let sub = &listed["data"][0];
    assert_eq!(sub["name"], "Team C");
    assert_eq!(sub["secret"], "s3");
    assert_eq!(sub["events"], json!(["user.created", "user.deleted"]));
    assert_eq!(sub["isActive"], false);
    assert_eq!(sub["partnerId"], 7);
    assert_eq!(sub["headers"]["X-Team"], "c");
}

#[tokio::test]
async fn import_without_file_field_is_bad_request() {
    let (app, _state) = build_test_app();
    let response = post_multipart(&app, "/api/import/webhooks", "upload", "x.csv", "url\n").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Classifier history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_lists_recent_classifications() {
    let (app, _state) = build_test_app();
    post_raw(
        &app,
        "/api/universal-webhook/acme",
        &[],
        br#"{"eventType":"security.alert"}"#.to_vec(),
    )
    .await;

    let json = body_json(get(&app, "/api/event-intelligence/history?limit=5").await).await;
    let entries = json["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["eventType"], "security.alert");
    assert_eq!(entries[0]["intelligence"]["priority"], "critical");
}
