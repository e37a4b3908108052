//! The usage ledger abstraction and its aggregate types.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::quota::QuotaLimits;
use crate::types::{DbId, Timestamp};

crate::define_text_enum! {
    /// How the assistant produced its answer.
    UsageMode {
        Api = "api",
        Fallback = "fallback",
        Simulated = "simulated",
    }
}

/// A usage event about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUsageEvent {
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub user_name: String,
    pub module: String,
    pub input_text: String,
    pub response_size: i32,
    pub tokens_used: i32,
    pub cost: f64,
    pub mode: UsageMode,
    pub response_time_ms: i32,
}

/// Totals over a tenant's events since some instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    pub requests: i64,
    pub tokens: i64,
    pub cost: f64,
    /// Mean of the ratings present; `None` when nobody rated.
    pub average_satisfaction: Option<f64>,
}

/// Current-month usage of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyUsage {
    pub year: i32,
    pub month: u32,
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorUsage {
    pub user_id: DbId,
    pub user_name: String,
    pub requests: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleUsage {
    pub module: String,
    pub requests: i64,
}

/// Organization dashboard figures for the current month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizationUsageStats {
    pub monthly: MonthlyUsage,
    pub top_users: Vec<ActorUsage>,
    pub average_satisfaction: Option<f64>,
    pub by_module: Vec<ModuleUsage>,
    pub limits: QuotaLimits,
    pub monthly_remaining: i64,
}

/// Append-only store of usage events.
///
/// Every read is tenant-scoped. Errors are infrastructure failures; callers
/// decide whether they block the action.
pub trait UsageLedger: Send + Sync {
    /// Events by `user_id` in `tenant_id` created at or after `since`.
    fn count_actor_since(
        &self,
        tenant_id: DbId,
        user_id: DbId,
        since: Timestamp,
    ) -> impl Future<Output = Result<i64, CoreError>> + Send;

    /// Events in `tenant_id` created at or after `since`.
    fn count_tenant_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
    ) -> impl Future<Output = Result<i64, CoreError>> + Send;

    /// Append an event stamped `at`, returning its id.
    fn append(
        &self,
        event: &NewUsageEvent,
        at: Timestamp,
    ) -> impl Future<Output = Result<DbId, CoreError>> + Send;

    fn totals_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
    ) -> impl Future<Output = Result<UsageTotals, CoreError>> + Send;

    /// Actors with the most events since `since`, most active first.
    fn top_actors_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<ActorUsage>, CoreError>> + Send;

    fn modules_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
    ) -> impl Future<Output = Result<Vec<ModuleUsage>, CoreError>> + Send;

    /// Store an already-clamped rating. `Ok(false)` when the entry does not
    /// exist in `tenant_id`.
    fn set_satisfaction(
        &self,
        tenant_id: DbId,
        entry_id: DbId,
        rating: i16,
    ) -> impl Future<Output = Result<bool, CoreError>> + Send;
}
