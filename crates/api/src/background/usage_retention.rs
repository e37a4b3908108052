//! Periodic purge of expired assistant usage events.

use std::time::Duration;

use chrono::Utc;
use qms_core::quota::retention_cutoff;
use qms_db::repositories::UsageEventRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// How often the purge runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the retention loop until `cancel` is triggered.
///
/// Deletes usage events older than `retention_days`. The first pass runs
/// immediately.
pub async fn run(pool: PgPool, retention_days: i64, cancel: CancellationToken) {
    tracing::info!(
        retention_days,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Usage retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Usage retention job stopping");
                break;
            }
            _ = interval.tick() => {
                purge_once(&pool, retention_days).await;
            }
        }
    }
}

/// One purge pass. Errors are logged; the next tick retries.
pub async fn purge_once(pool: &PgPool, retention_days: i64) -> Option<u64> {
    let cutoff = retention_cutoff(Utc::now(), retention_days);
    match UsageEventRepo::delete_older_than(pool, cutoff).await {
        Ok(deleted) => {
            if deleted > 0 {
                tracing::info!(deleted, %cutoff, "Usage retention: purged old events");
            } else {
                tracing::debug!("Usage retention: nothing to purge");
            }
            Some(deleted)
        }
        Err(e) => {
            tracing::error!(error = %e, "Usage retention: purge failed");
            None
        }
    }
}
