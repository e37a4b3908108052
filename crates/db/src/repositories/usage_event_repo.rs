//! Repository for the append-only `usage_events` ledger.

use qms_core::quota::{ActorUsage, ModuleUsage, NewUsageEvent, UsageTotals};
use qms_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::usage_event::UsageEvent;

const COLUMNS: &str = "id, tenant_id, user_id, user_name, module, input_text, response_size, \
    tokens_used, cost, satisfaction, mode, response_time_ms, created_at";

pub struct UsageEventRepo;

impl UsageEventRepo {
    /// Events by one actor in a tenant since `since` (inclusive).
    pub async fn count_actor_since(
        pool: &PgPool,
        tenant_id: DbId,
        user_id: DbId,
        since: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_events
             WHERE user_id = $1 AND tenant_id = $2 AND created_at >= $3",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    pub async fn count_tenant_since(
        pool: &PgPool,
        tenant_id: DbId,
        since: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_events WHERE tenant_id = $1 AND created_at >= $2",
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    /// Append an event stamped `at`.
    pub async fn insert(
        pool: &PgPool,
        event: &NewUsageEvent,
        at: Timestamp,
    ) -> Result<UsageEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO usage_events
                (tenant_id, user_id, user_name, module, input_text, response_size,
                 tokens_used, cost, mode, response_time_ms, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UsageEvent>(&query)
            .bind(event.tenant_id)
            .bind(event.user_id)
            .bind(&event.user_name)
            .bind(&event.module)
            .bind(&event.input_text)
            .bind(event.response_size)
            .bind(event.tokens_used)
            .bind(event.cost)
            .bind(event.mode.as_str())
            .bind(event.response_time_ms)
            .bind(at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<UsageEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM usage_events WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, UsageEvent>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// Request, token and cost totals plus the mean rating since `since`.
    pub async fn totals_since(
        pool: &PgPool,
        tenant_id: DbId,
        since: Timestamp,
    ) -> Result<UsageTotals, sqlx::Error> {
        let (requests, tokens, cost, average_satisfaction): (i64, i64, f64, Option<f64>) =
            sqlx::query_as(
                "SELECT COUNT(*),
                        COALESCE(SUM(tokens_used), 0)::BIGINT,
                        COALESCE(SUM(cost), 0)::FLOAT8,
                        AVG(satisfaction)::FLOAT8
                 FROM usage_events
                 WHERE tenant_id = $1 AND created_at >= $2",
            )
            .bind(tenant_id)
            .bind(since)
            .fetch_one(pool)
            .await?;

        Ok(UsageTotals {
            requests,
            tokens,
            cost,
            average_satisfaction,
        })
    }

    /// Most active actors since `since`, ties broken by actor id.
    pub async fn top_actors_since(
        pool: &PgPool,
        tenant_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> Result<Vec<ActorUsage>, sqlx::Error> {
        let rows: Vec<(DbId, String, i64, f64)> = sqlx::query_as(
            "SELECT user_id, MAX(user_name), COUNT(*), COALESCE(SUM(cost), 0)::FLOAT8
             FROM usage_events
             WHERE tenant_id = $1 AND created_at >= $2
             GROUP BY user_id
             ORDER BY COUNT(*) DESC, user_id
             LIMIT $3",
        )
        .bind(tenant_id)
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, user_name, requests, cost)| ActorUsage {
                user_id,
                user_name,
                requests,
                cost,
            })
            .collect())
    }

    /// Event counts per module since `since`, busiest first.
    pub async fn modules_since(
        pool: &PgPool,
        tenant_id: DbId,
        since: Timestamp,
    ) -> Result<Vec<ModuleUsage>, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT module, COUNT(*) FROM usage_events
             WHERE tenant_id = $1 AND created_at >= $2
             GROUP BY module
             ORDER BY COUNT(*) DESC, module",
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(module, requests)| ModuleUsage { module, requests })
            .collect())
    }

    /// Store a rating already clamped into range. Returns `true` if the
    /// entry exists in `tenant_id`.
    pub async fn set_satisfaction(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        rating: i16,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE usage_events SET satisfaction = $3 WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(rating)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Purge events created before `cutoff`. Returns the number removed.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM usage_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
