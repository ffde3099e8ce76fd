//! API integration tests for attestrace-server.
//!
//! These drive the full router with JSON requests, covering challenge
//! issuance, attested trace submission and the failure envelope.

use std::sync::Arc;

use async_trait::async_trait;
use attestrace_core::test_support::{test_challenges, TestPki, TEST_APP_ID, TEST_SECRET};
use attestrace_core::{DeploymentTier, ServerSecret, ShareTemplate};
use attestrace_server::{create_router, AppState, BlobStore, Config, MemoryBlobStore, StoreError};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const PUBLIC_BASE: &str = "https://traces.example.org";

fn test_config(pki: &TestPki, tier: DeploymentTier) -> Config {
    let mut config = Config::new(
        Arc::new(pki.trust_root()),
        TEST_APP_ID,
        ServerSecret::new(TEST_SECRET),
        "traces",
    );
    config.tier = tier;
    config.public_base_url = PUBLIC_BASE.to_string();
    config
}

fn app_with_store(config: &Config, store: Arc<dyn BlobStore>) -> Router {
    let state = AppState::with_store(config, store, ShareTemplate::builtin());
    create_router(state, config)
}

fn test_app(pki: &TestPki, tier: DeploymentTier) -> (Router, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryBlobStore::new(PUBLIC_BASE));
    let config = test_config(pki, tier);
    (app_with_store(&config, store.clone()), store)
}

async fn post(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post_json(app: Router, body: &Value) -> (StatusCode, Value) {
    post(app, body.to_string()).await
}

fn trace_body(key_id: &str, attestation: &str) -> Value {
    json!({
        "key_id": key_id,
        "attestation_object": attestation,
        "id": "trace-1",
        "created": 1_700_000_000,
        "model": "olmoe-1b-7b",
        "messages": [
            {"role": "system", "content": "You are helpful."},
            {"role": "user", "content": "Hi </script>"},
            {"role": "assistant", "content": "Hello!"}
        ]
    })
}

fn assert_failure(body: &Value, message: &str) {
    assert_eq!(body["outcome"], "failure");
    assert_eq!(body["error"], message);
}

// ============================================================================
// Challenge Tests
// ============================================================================

#[tokio::test]
async fn test_challenge_is_deterministic() {
    let pki = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Development);

    let (status, body) = post_json(app.clone(), &json!({"key_id": "abc123"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "success");
    assert_eq!(
        body["challenge"],
        "VOPwwDSqrE43n87c9vfxB1QVDL1JOuB8e7tjt70lYJ4="
    );

    let (_, again) = post_json(app, &json!({"key_id": "abc123"})).await;
    assert_eq!(again["challenge"], body["challenge"]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_challenge_rejects_invalid_key_id() {
    let pki = TestPki::generate();
    let (app, _) = test_app(&pki, DeploymentTier::Development);

    for body in [json!({}), json!({"key_id": ""}), json!({"key_id": 42})] {
        let (status, response) = post_json(app.clone(), &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_failure(&response, "Invalid key_id");
    }
}

#[tokio::test]
async fn test_non_object_body_rejected() {
    let pki = TestPki::generate();
    let (app, _) = test_app(&pki, DeploymentTier::Development);

    for body in ["[1, 2]", "\"key\"", "not json", ""] {
        let (status, response) = post(app.clone(), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {:?}", body);
        assert_failure(&response, "Invalid request body");
    }
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let pki = TestPki::generate();
    let store = Arc::new(MemoryBlobStore::new(PUBLIC_BASE));
    let mut config = test_config(&pki, DeploymentTier::Test);
    config.max_request_size_bytes = 256;
    let app = app_with_store(&config, store.clone());

    let padding = "x".repeat(512);
    let body = json!({"key_id": "abc123", "padding": padding});
    let (status, response) = post_json(app, &body).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_failure(&response, "Invalid request body");
    assert!(store.is_empty());
}

// ============================================================================
// Trace Submission Tests
// ============================================================================

#[tokio::test]
async fn test_attested_trace_is_stored_and_shared() {
    let pki = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Development);
    let attestation = pki.attestation().build(&test_challenges());

    let body = trace_body(&attestation.key_id, &attestation.object_base64());
    let (status, response) = post_json(app, &body).await;

    assert_eq!(status, StatusCode::OK, "response: {}", response);
    assert_eq!(response["outcome"], "success");
    assert_eq!(
        response["url"],
        format!("{}/share/olmoe-1b-7b/20231114/trace-1.html", PUBLIC_BASE)
    );

    assert_eq!(
        store.keys(),
        vec![
            "logs/olmoe-1b-7b/20231114/trace-1.json".to_string(),
            "share/olmoe-1b-7b/20231114/trace-1.html".to_string(),
        ]
    );

    let log = store.get("logs/olmoe-1b-7b/20231114/trace-1.json").unwrap();
    assert_eq!(log.content_type, "application/json");
    let persisted: Value = serde_json::from_slice(&log.body).unwrap();
    assert!(persisted.get("key_id").is_none());
    assert!(persisted.get("attestation_object").is_none());
    assert_eq!(persisted["object"], "chat.trace");
    assert_eq!(persisted["system_fingerprint"], "olmoe-1b-7b");
    assert_eq!(persisted["messages"].as_array().unwrap().len(), 3);

    let page = store.get("share/olmoe-1b-7b/20231114/trace-1.html").unwrap();
    assert_eq!(page.content_type, "text/html");
    let html = String::from_utf8(page.body).unwrap();
    assert!(html.contains("\"id\":\"trace-1\""));
    assert!(html.contains("Hi <\\/script>"));
    assert!(!html.contains("[[ADD_JSON_HERE]]"));
}

#[tokio::test]
async fn test_failed_attestation_stores_nothing() {
    let pki = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Development);
    let attestation = pki.attestation().sign_count(3).build(&test_challenges());

    let body = trace_body(&attestation.key_id, &attestation.object_base64());
    let (status, response) = post_json(app, &body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_failure(&response, "Attestation verification failed");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_production_tier_rejects_development_attestation() {
    let pki = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Production);
    let attestation = pki.attestation().build(&test_challenges());

    let body = trace_body(&attestation.key_id, &attestation.object_base64());
    let (status, _) = post_json(app, &body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_untrusted_root_rejected() {
    let pki = TestPki::generate();
    let other = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Development);
    let attestation = other.attestation().build(&test_challenges());

    let body = trace_body(&attestation.key_id, &attestation.object_base64());
    let (status, _) = post_json(app, &body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_garbage_attestation_rejected() {
    let pki = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Development);

    let (status, response) = post_json(app.clone(), &trace_body("abc123", "AAAA")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_failure(&response, "Attestation verification failed");

    let mut body = trace_body("abc123", "AAAA");
    body["attestation_object"] = Value::Null;
    let (status, _) = post_json(app, &body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_test_tier_skips_verification() {
    let pki = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Test);

    let (status, response) = post_json(app, &trace_body("abc123", "not an attestation")).await;

    assert_eq!(status, StatusCode::OK, "response: {}", response);
    assert_eq!(response["outcome"], "success");
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_invalid_trace_rejected() {
    let pki = TestPki::generate();
    let (app, store) = test_app(&pki, DeploymentTier::Test);

    let mut missing_model = trace_body("abc123", "x");
    missing_model.as_object_mut().unwrap().remove("model");
    let (status, response) = post_json(app.clone(), &missing_model).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&response, "Invalid trace format");

    let mut bad_role = trace_body("abc123", "x");
    bad_role["messages"][1]["role"] = json!("tool");
    let (status, response) = post_json(app.clone(), &bad_role).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&response, "Invalid message format");

    let mut extra_field = trace_body("abc123", "x");
    extra_field["temperature"] = json!(0.7);
    let (status, _) = post_json(app, &extra_field).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(store.is_empty());
}

/// Store whose writes always fail
struct UnavailableStore;

#[async_trait]
impl BlobStore for UnavailableStore {
    async fn put(&self, key: &str, _body: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        Err(StoreError::Status {
            key: key.to_string(),
            status: 503,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", PUBLIC_BASE, key)
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

#[tokio::test]
async fn test_storage_failure_reported() {
    let pki = TestPki::generate();
    let config = test_config(&pki, DeploymentTier::Test);
    let app = app_with_store(&config, Arc::new(UnavailableStore));

    let (status, response) = post_json(app, &trace_body("abc123", "x")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_failure(&response, "Failed to store trace");
}

// ============================================================================
// Health & Docs Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let pki = TestPki::generate();
    let (app, _) = test_app(&pki, DeploymentTier::Development);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "attestrace-server");
    assert_eq!(json["tier"], "development");
}

#[tokio::test]
async fn test_openapi_document_served() {
    let pki = TestPki::generate();
    let (app, _) = test_app(&pki, DeploymentTier::Development);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["info"]["title"], "Attestrace API");
    assert!(json["paths"]["/"]["post"].is_object());
    assert!(json["paths"]["/health"]["get"].is_object());
}

#[tokio::test]
async fn test_get_on_dispatch_not_allowed() {
    let pki = TestPki::generate();
    let (app, _) = test_app(&pki, DeploymentTier::Development);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
