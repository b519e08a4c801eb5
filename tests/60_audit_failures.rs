mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use admin_api_rust::audit::AuditRecord;
use admin_api_rust::auth::{issue_token, CallerIdentity, JwtVerifier, Role};
use admin_api_rust::config::AppConfig;
use admin_api_rust::database::{AuditFilter, AuditStore, MemoryStore, StoreError};
use admin_api_rust::{router, AppState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Audit sink that is down: every append fails, but attempts are counted.
#[derive(Default)]
struct BrokenAuditStore {
    attempts: AtomicUsize,
}

#[async_trait]
impl AuditStore for BrokenAuditStore {
    async fn append(&self, _record: &AuditRecord) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("audit sink offline".into()))
    }

    async fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(Vec::new())
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn failed_audit_write_does_not_fail_the_mutation() {
    let config = AppConfig::for_tests(common::TEST_SECRET);
    let documents = MemoryStore::new();
    let audit = Arc::new(BrokenAuditStore::default());
    let state = AppState::new(
        config.clone(),
        Arc::new(JwtVerifier::new(&config.security)),
        Arc::new(documents),
        audit.clone(),
    );
    let app = router(state);

    let token = issue_token(
        &CallerIdentity { user_id: "root".into(), email: "root@example.com".into(), role: Role::SuperAdmin },
        chrono::Duration::hours(1),
        &config.security,
    )
    .unwrap();

    let create = Request::builder()
        .method("POST")
        .uri("/api/admin/feature-flags")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "x", "key": "x-flag" }).to_string()))
        .unwrap();
    let (status, body) = send(&app, create).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["key"], "x-flag");
    assert_eq!(audit.attempts.load(Ordering::SeqCst), 1);

    let list = Request::builder()
        .uri("/api/admin/feature-flags")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (_, flags) = send(&app, list).await;
    assert_eq!(flags["data"]["total"], 1);

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, health) = send(&app, health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["data"]["audit"]["writeFailures"], 1);
    assert!(health["data"]["audit"]["lastFailureAt"].is_string());
}
