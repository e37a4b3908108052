use std::sync::Arc;

use qms_core::clock::SystemClock;
use qms_db::PgUsageLedger;
use qms_events::EventBus;

use crate::config::ServerConfig;
use crate::quota::QuotaEnforcer;

/// Quota enforcer wired to the PostgreSQL ledger and the wall clock.
pub type UsageQuota = QuotaEnforcer<PgUsageLedger, SystemClock>;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: inner data is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: qms_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<EventBus>,
    pub quota: Arc<UsageQuota>,
}

impl AppState {
    /// Assemble state, building the quota enforcer from `config.quota`.
    pub fn new(pool: qms_db::DbPool, config: ServerConfig, event_bus: Arc<EventBus>) -> Self {
        let quota = QuotaEnforcer::new(
            PgUsageLedger::new(pool.clone()),
            SystemClock,
            config.quota.clone(),
            Arc::clone(&event_bus),
        );
        Self {
            pool,
            config: Arc::new(config),
            event_bus,
            quota: Arc::new(quota),
        }
    }
}
