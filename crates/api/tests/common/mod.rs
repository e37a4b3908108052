#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use qms_core::quota::QuotaConfig;
use qms_core::roles::{ROLE_ADMIN, ROLE_MEMBER};
use qms_events::EventBus;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceExt;

use qms_api::auth::jwt::{generate_access_token, JwtConfig, TokenSubject};
use qms_api::config::ServerConfig;
use qms_api::router::build_app_router;
use qms_api::state::AppState;

pub const TENANT: i64 = 1;
pub const OTHER_TENANT: i64 = 2;
pub const ADMIN_ID: i64 = 100;
pub const MEMBER_ID: i64 = 200;

/// Build a test `ServerConfig` with safe defaults and the standard quota.
pub fn test_config() -> ServerConfig {
    test_config_with_quota(QuotaConfig::default())
}

pub fn test_config_with_quota(quota: QuotaConfig) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "test-secret-for-integration-tests".to_string(),
            access_token_expiry_mins: 15,
        },
        quota,
        usage_retention_days: 90,
    }
}

/// Build the full application router, using the given database pool.
///
/// Goes through [`build_app_router`] so tests exercise the production
/// middleware stack.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_config(pool, test_config())
}

pub fn build_test_app_with_config(pool: PgPool, config: ServerConfig) -> Router {
    let event_bus = Arc::new(EventBus::default());
    let state = AppState::new(pool, config.clone(), event_bus);
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

pub fn token_for(user_id: i64, tenant_id: i64, role: &str) -> String {
    let subject = TokenSubject {
        user_id,
        tenant_id,
        name: "Test User",
        role,
    };
    generate_access_token(&subject, &test_config().jwt).expect("token should sign")
}

pub fn admin_token() -> String {
    token_for(ADMIN_ID, TENANT, ROLE_ADMIN)
}

pub fn member_token() -> String {
    token_for(MEMBER_ID, TENANT, ROLE_MEMBER)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

async fn send(
    app: Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Send an unauthenticated GET.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, "GET", uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, "GET", uri, Some(token), None).await
}

pub async fn post_json(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, "POST", uri, Some(token), Some(body)).await
}

pub async fn put_json(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, "PUT", uri, Some(token), Some(body)).await
}

pub async fn delete(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, "DELETE", uri, Some(token), None).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and return the `data` field of a success envelope.
pub async fn expect_data(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["success"], true, "unexpected body: {json}");
    json["data"].clone()
}

/// Assert the status and return the `error` code of an error envelope.
pub async fn expect_error(response: Response<Body>, status: StatusCode) -> String {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["success"], false, "unexpected body: {json}");
    assert!(json["message"].is_string());
    json["error"].as_str().unwrap_or_default().to_string()
}
