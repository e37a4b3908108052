//! Usage ledger models.

use qms_core::quota::UsageMode;
use qms_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `usage_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageEvent {
    pub id: DbId,
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub user_name: String,
    pub module: String,
    pub input_text: String,
    pub response_size: i32,
    pub tokens_used: i32,
    pub cost: f64,
    pub satisfaction: Option<i16>,
    #[sqlx(try_from = "String")]
    pub mode: UsageMode,
    pub response_time_ms: i32,
    pub created_at: Timestamp,
}

/// Request body reporting one consumed assistant interaction. Tenant and
/// actor come from the caller's identity.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordUsageRequest {
    #[validate(length(min = 1, max = 100))]
    pub module: String,
    #[serde(default)]
    pub input_text: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub response_size: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub tokens_used: i32,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub cost: f64,
    pub mode: Option<UsageMode>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub response_time_ms: i32,
}

/// Request body for rating an answer. Out-of-range values are clamped.
#[derive(Debug, Clone, Deserialize)]
pub struct SatisfactionRequest {
    pub rating: i32,
}
