//! HTTP-level integration tests for the assistant usage quota.

mod common;

use axum::http::StatusCode;
use common::{admin_token, expect_data, get_auth, member_token, post_json, put_json, token_for};
use qms_core::quota::{QuotaConfig, QuotaLimits};
use serde_json::json;
use sqlx::PgPool;

fn usage(module: &str) -> serde_json::Value {
    json!({
        "module": module,
        "input_text": "How do I open a corrective action?",
        "response_size": 512,
        "tokens_used": 120,
        "cost": 0.5,
        "response_time_ms": 850
    })
}

async fn record(pool: &PgPool, token: &str, module: &str) -> i64 {
    let app = common::build_test_app(pool.clone());
    let response = post_json(app, "/api/v1/assistant/usage", token, usage(module)).await;
    let data = expect_data(response, StatusCode::ACCEPTED).await;
    data["id"].as_i64().unwrap()
}

async fn check(pool: &PgPool, token: &str) -> serde_json::Value {
    let app = common::build_test_app(pool.clone());
    let response = post_json(app, "/api/v1/assistant/usage/check", token, json!({})).await;
    expect_data(response, StatusCode::OK).await
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn fresh_actor_has_full_hourly_allowance(pool: PgPool) {
    let decision = check(&pool, &member_token()).await;
    assert_eq!(decision["allowed"], true);
    assert_eq!(decision["remaining"], 10);
    assert!(decision.get("reason").is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn hourly_cap_boundary(pool: PgPool) {
    let token = member_token();
    for _ in 0..9 {
        record(&pool, &token, "audits").await;
    }
    let decision = check(&pool, &token).await;
    assert_eq!(decision["allowed"], true);
    assert_eq!(decision["remaining"], 1);

    record(&pool, &token, "audits").await;
    let decision = check(&pool, &token).await;
    assert_eq!(decision["allowed"], false);
    assert_eq!(decision["remaining"], 0);
    assert!(decision["reason"].is_string());

    // The cap is per actor: a colleague is unaffected.
    let colleague = token_for(common::MEMBER_ID + 1, common::TENANT, "member");
    let decision = check(&pool, &colleague).await;
    assert_eq!(decision["allowed"], true);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn tenant_override_applies(pool: PgPool) {
    let quota = QuotaConfig::default().with_override(
        common::TENANT,
        QuotaLimits {
            hourly_limit: 2,
            ..QuotaConfig::default().defaults
        },
    );
    let config = common::test_config_with_quota(quota);
    let token = member_token();
    record(&pool, &token, "audits").await;
    record(&pool, &token, "audits").await;

    let app = common::build_test_app_with_config(pool, config);
    let response = post_json(app, "/api/v1/assistant/usage/check", &token, json!({})).await;
    let decision = expect_data(response, StatusCode::OK).await;
    assert_eq!(decision["allowed"], false);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn satisfaction_is_clamped(pool: PgPool) {
    let id = record(&pool, &member_token(), "audits").await;
    let uri = format!("/api/v1/assistant/usage/{id}/satisfaction");

    let app = common::build_test_app(pool.clone());
    let response = put_json(app, &uri, &member_token(), json!({"rating": 9})).await;
    let data = expect_data(response, StatusCode::OK).await;
    assert_eq!(data["rating"], 5);

    let app = common::build_test_app(pool);
    let response = put_json(app, &uri, &member_token(), json!({"rating": 0})).await;
    let data = expect_data(response, StatusCode::OK).await;
    assert_eq!(data["rating"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn satisfaction_on_foreign_entry_is_404(pool: PgPool) {
    let id = record(&pool, &member_token(), "audits").await;
    let foreign = token_for(common::MEMBER_ID, common::OTHER_TENANT, "member");

    let app = common::build_test_app(pool);
    let response = put_json(
        app,
        &format!("/api/v1/assistant/usage/{id}/satisfaction"),
        &foreign,
        json!({"rating": 4}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_usage_report_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/assistant/usage",
        &member_token(),
        json!({"module": "", "tokens_used": -5}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn monthly_usage_and_organization_stats(pool: PgPool) {
    let member = member_token();
    let admin = admin_token();
    record(&pool, &member, "audits").await;
    record(&pool, &member, "audits").await;
    let rated = record(&pool, &admin, "risks").await;

    let app = common::build_test_app(pool.clone());
    put_json(
        app,
        &format!("/api/v1/assistant/usage/{rated}/satisfaction"),
        &admin,
        json!({"rating": 4}),
    )
    .await;

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, "/api/v1/assistant/usage/monthly", &member).await;
    let monthly = expect_data(response, StatusCode::OK).await;
    assert_eq!(monthly["total_requests"], 3);
    assert_eq!(monthly["total_tokens"], 360);

    let app = common::build_test_app(pool);
    let response = get_auth(app, "/api/v1/assistant/usage/stats", &admin).await;
    let stats = expect_data(response, StatusCode::OK).await;
    assert_eq!(stats["monthly"]["total_requests"], 3);
    assert_eq!(stats["top_users"][0]["user_id"], common::MEMBER_ID);
    assert_eq!(stats["top_users"][0]["requests"], 2);
    assert_eq!(stats["average_satisfaction"], 4.0);
    assert_eq!(stats["by_module"].as_array().unwrap().len(), 2);
    assert_eq!(stats["limits"]["monthly_limit"], 1000);
    assert_eq!(stats["monthly_remaining"], 997);
}
