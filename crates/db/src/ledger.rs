//! [`UsageLedger`] backed by the `usage_events` table.

use qms_core::error::CoreError;
use qms_core::quota::{ActorUsage, ModuleUsage, NewUsageEvent, UsageLedger, UsageTotals};
use qms_core::types::{DbId, Timestamp};

use crate::repositories::UsageEventRepo;
use crate::DbPool;

#[derive(Debug, Clone)]
pub struct PgUsageLedger {
    pool: DbPool,
}

impl PgUsageLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn ledger_error(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("usage ledger: {err}"))
}

impl UsageLedger for PgUsageLedger {
    async fn count_actor_since(
        &self,
        tenant_id: DbId,
        user_id: DbId,
        since: Timestamp,
    ) -> Result<i64, CoreError> {
        UsageEventRepo::count_actor_since(&self.pool, tenant_id, user_id, since)
            .await
            .map_err(ledger_error)
    }

    async fn count_tenant_since(&self, tenant_id: DbId, since: Timestamp) -> Result<i64, CoreError> {
        UsageEventRepo::count_tenant_since(&self.pool, tenant_id, since)
            .await
            .map_err(ledger_error)
    }

    async fn append(&self, event: &NewUsageEvent, at: Timestamp) -> Result<DbId, CoreError> {
        UsageEventRepo::insert(&self.pool, event, at)
            .await
            .map(|row| row.id)
            .map_err(ledger_error)
    }

    async fn totals_since(&self, tenant_id: DbId, since: Timestamp) -> Result<UsageTotals, CoreError> {
        UsageEventRepo::totals_since(&self.pool, tenant_id, since)
            .await
            .map_err(ledger_error)
    }

    async fn top_actors_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> Result<Vec<ActorUsage>, CoreError> {
        UsageEventRepo::top_actors_since(&self.pool, tenant_id, since, limit)
            .await
            .map_err(ledger_error)
    }

    async fn modules_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
    ) -> Result<Vec<ModuleUsage>, CoreError> {
        UsageEventRepo::modules_since(&self.pool, tenant_id, since)
            .await
            .map_err(ledger_error)
    }

    async fn set_satisfaction(
        &self,
        tenant_id: DbId,
        entry_id: DbId,
        rating: i16,
    ) -> Result<bool, CoreError> {
        UsageEventRepo::set_satisfaction(&self.pool, tenant_id, entry_id, rating)
            .await
            .map_err(ledger_error)
    }
}
