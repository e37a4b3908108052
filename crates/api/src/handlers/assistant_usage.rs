//! Handlers for assistant usage quota, accounting and feedback.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use qms_core::quota::{
    MonthlyUsage, NewUsageEvent, OrganizationUsageStats, QuotaDecision, UsageMode,
};
use qms_core::types::DbId;
use qms_db::models::usage_event::{RecordUsageRequest, SatisfactionRequest};
use serde::Serialize;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Outcome of reporting a usage entry. `id` is absent when the ledger
/// could not store it.
#[derive(Debug, Serialize)]
pub struct RecordedUsage {
    pub id: Option<DbId>,
}

#[derive(Debug, Serialize)]
pub struct SatisfactionRecorded {
    pub id: DbId,
    pub rating: i16,
}

/// POST /api/v1/assistant/usage/check
///
/// Always 200: a denial is a normal result, not an error.
pub async fn check(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<DataResponse<QuotaDecision>> {
    let decision = state.quota.check_limit(user.user_id, user.tenant_id).await;
    Json(DataResponse::new(decision))
}

/// POST /api/v1/assistant/usage
pub async fn record(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<RecordUsageRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<RecordedUsage>>)> {
    input.validate()?;
    let event = NewUsageEvent {
        tenant_id: user.tenant_id,
        user_id: user.user_id,
        user_name: user.name,
        module: input.module,
        input_text: input.input_text,
        response_size: input.response_size,
        tokens_used: input.tokens_used,
        cost: input.cost,
        mode: input.mode.unwrap_or(UsageMode::Api),
        response_time_ms: input.response_time_ms,
    };
    let id = state.quota.record_usage(event).await;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse::new(RecordedUsage { id })),
    ))
}

/// GET /api/v1/assistant/usage/monthly
pub async fn monthly(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<MonthlyUsage>>> {
    let usage = state.quota.get_monthly_usage(user.tenant_id).await?;
    Ok(Json(DataResponse::new(usage)))
}

/// GET /api/v1/assistant/usage/stats
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<OrganizationUsageStats>>> {
    let stats = state.quota.get_organization_stats(user.tenant_id).await?;
    Ok(Json(DataResponse::new(stats)))
}

/// PUT /api/v1/assistant/usage/{id}/satisfaction
pub async fn satisfaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<SatisfactionRequest>,
) -> AppResult<Json<DataResponse<SatisfactionRecorded>>> {
    let rating = state
        .quota
        .update_satisfaction(user.tenant_id, id, input.rating)
        .await?;
    Ok(Json(DataResponse::new(SatisfactionRecorded { id, rating })))
}
