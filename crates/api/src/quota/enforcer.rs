//! Admission control and accounting for the metered assistant feature.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Datelike;
use qms_core::clock::Clock;
use qms_core::error::CoreError;
use qms_core::quota::{
    self, clamp_satisfaction, FailurePolicy, MonthlyUsage, NewUsageEvent,
    OrganizationUsageStats, QuotaConfig, QuotaDecision, QuotaLimits, UsageLedger,
    TOP_ACTORS_LIMIT,
};
use qms_core::types::{DbId, Timestamp};
use qms_events::{event_types, EventBus, PlatformEvent};

/// Reason returned when the ledger cannot be read under `fail_closed`.
pub const UNAVAILABLE_REASON: &str =
    "Usage limits cannot be verified right now. Please try again shortly.";

/// Tenant and calendar month a warning was issued for.
type WarningKey = (DbId, i32, u32);

/// Gates assistant usage against hourly and monthly caps.
///
/// Generic over the ledger and clock so tests can run against
/// [`qms_core::quota::MemoryUsageLedger`] and a manual clock.
pub struct QuotaEnforcer<L, C> {
    ledger: L,
    clock: C,
    config: QuotaConfig,
    event_bus: Arc<EventBus>,
    warned: Mutex<HashSet<WarningKey>>,
}

impl<L: UsageLedger, C: Clock> QuotaEnforcer<L, C> {
    pub fn new(ledger: L, clock: C, config: QuotaConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            ledger,
            clock,
            config,
            event_bus,
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn limits_for(&self, tenant_id: DbId) -> QuotaLimits {
        self.config.limits_for(tenant_id)
    }

    /// Decide whether `user_id` may consume one more interaction.
    ///
    /// Ledger failures never surface as errors: they are resolved by the
    /// configured [`FailurePolicy`].
    pub async fn check_limit(&self, user_id: DbId, tenant_id: DbId) -> QuotaDecision {
        let now = self.clock.now();
        let limits = self.config.limits_for(tenant_id);

        let hourly = match self
            .ledger
            .count_actor_since(tenant_id, user_id, quota::hourly_window_start(now))
            .await
        {
            Ok(count) => count,
            Err(e) => return self.on_ledger_failure(tenant_id, user_id, &e),
        };

        // The monthly count is irrelevant once the hourly cap is hit.
        if hourly >= limits.hourly_limit {
            let eval = quota::evaluate(&limits, hourly, 0);
            tracing::info!(tenant_id, user_id, hourly, "Hourly usage limit reached");
            return eval.decision;
        }

        let monthly = match self
            .ledger
            .count_tenant_since(tenant_id, quota::month_start(now))
            .await
        {
            Ok(count) => count,
            Err(e) => return self.on_ledger_failure(tenant_id, user_id, &e),
        };

        let eval = quota::evaluate(&limits, hourly, monthly);
        if eval.denied_by.is_some() {
            tracing::info!(tenant_id, monthly, "Monthly usage limit reached");
        }
        if eval.warn {
            self.warn_once(tenant_id, now, monthly, &limits);
        }
        eval.decision
    }

    /// Append a usage event stamped with the current time.
    ///
    /// Returns the new entry id, or `None` when the ledger rejected the
    /// write. Failures are logged and never reach the caller.
    pub async fn record_usage(&self, event: NewUsageEvent) -> Option<DbId> {
        let now = self.clock.now();
        match self.ledger.append(&event, now).await {
            Ok(id) => {
                tracing::debug!(
                    tenant_id = event.tenant_id,
                    user_id = event.user_id,
                    module = %event.module,
                    entry_id = id,
                    "Usage recorded"
                );
                Some(id)
            }
            Err(e) => {
                tracing::error!(
                    tenant_id = event.tenant_id,
                    user_id = event.user_id,
                    error = %e,
                    "Failed to record usage"
                );
                None
            }
        }
    }

    /// Request, token and cost totals for the current calendar month.
    pub async fn get_monthly_usage(&self, tenant_id: DbId) -> Result<MonthlyUsage, CoreError> {
        let now = self.clock.now();
        let totals = self
            .ledger
            .totals_since(tenant_id, quota::month_start(now))
            .await?;
        Ok(MonthlyUsage {
            year: now.year(),
            month: now.month(),
            total_requests: totals.requests,
            total_tokens: totals.tokens,
            total_cost: totals.cost,
        })
    }

    /// Dashboard figures for the current month.
    pub async fn get_organization_stats(
        &self,
        tenant_id: DbId,
    ) -> Result<OrganizationUsageStats, CoreError> {
        let now = self.clock.now();
        let since = quota::month_start(now);
        let limits = self.config.limits_for(tenant_id);

        let totals = self.ledger.totals_since(tenant_id, since).await?;
        let top_users = self
            .ledger
            .top_actors_since(tenant_id, since, TOP_ACTORS_LIMIT)
            .await?;
        let by_module = self.ledger.modules_since(tenant_id, since).await?;

        Ok(OrganizationUsageStats {
            monthly: MonthlyUsage {
                year: now.year(),
                month: now.month(),
                total_requests: totals.requests,
                total_tokens: totals.tokens,
                total_cost: totals.cost,
            },
            top_users,
            average_satisfaction: totals.average_satisfaction,
            by_module,
            monthly_remaining: (limits.monthly_limit - totals.requests).max(0),
            limits,
        })
    }

    /// Rate an entry after clamping `rating` into the valid range.
    ///
    /// An entry outside the caller's tenant is `NotFound`. Ledger failures
    /// are logged and swallowed.
    pub async fn update_satisfaction(
        &self,
        tenant_id: DbId,
        entry_id: DbId,
        rating: i32,
    ) -> Result<i16, CoreError> {
        let clamped = clamp_satisfaction(rating);
        match self
            .ledger
            .set_satisfaction(tenant_id, entry_id, clamped)
            .await
        {
            Ok(true) => Ok(clamped),
            Ok(false) => Err(CoreError::not_found("UsageEvent", entry_id)),
            Err(e) => {
                tracing::error!(tenant_id, entry_id, error = %e, "Failed to record satisfaction");
                Ok(clamped)
            }
        }
    }

    fn on_ledger_failure(&self, tenant_id: DbId, user_id: DbId, err: &CoreError) -> QuotaDecision {
        match self.config.failure_policy {
            FailurePolicy::FailOpen => {
                tracing::error!(
                    tenant_id,
                    user_id,
                    error = %err,
                    "Usage limit check failed, admitting (fail_open)"
                );
                QuotaDecision::allowed_unchecked()
            }
            FailurePolicy::FailClosed => {
                tracing::error!(
                    tenant_id,
                    user_id,
                    error = %err,
                    "Usage limit check failed, denying (fail_closed)"
                );
                QuotaDecision::denied(UNAVAILABLE_REASON)
            }
        }
    }

    /// Publish the threshold warning at most once per tenant and calendar
    /// month. Keys from earlier months are dropped on the way.
    fn warn_once(&self, tenant_id: DbId, now: Timestamp, monthly: i64, limits: &QuotaLimits) {
        let (year, month) = (now.year(), now.month());
        let first = {
            let mut warned = self.warned.lock().unwrap_or_else(|e| e.into_inner());
            warned.retain(|&(_, y, m)| (y, m) == (year, month));
            warned.insert((tenant_id, year, month))
        };
        if !first {
            return;
        }

        tracing::debug!(
            tenant_id,
            monthly,
            threshold = limits.warning_threshold,
            monthly_limit = limits.monthly_limit,
            "Organization reached the usage warning threshold"
        );
        self.event_bus.publish(
            PlatformEvent::new(event_types::QUOTA_WARNING_THRESHOLD_REACHED, tenant_id)
                .with_payload(serde_json::json!({
                    "monthly_count": monthly,
                    "warning_threshold": limits.warning_threshold,
                    "monthly_limit": limits.monthly_limit,
                    "year": now.year(),
                    "month": now.month(),
                })),
        );
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};
    use qms_core::clock::ManualClock;
    use qms_core::quota::{MemoryUsageLedger, UsageMode};

    use super::*;

    const TENANT: DbId = 1;
    const USER: DbId = 10;

    fn usage(tenant_id: DbId, user_id: DbId) -> NewUsageEvent {
        NewUsageEvent {
            tenant_id,
            user_id,
            user_name: format!("user-{user_id}"),
            module: "audits".into(),
            input_text: String::new(),
            response_size: 10,
            tokens_used: 5,
            cost: 0.01,
            mode: UsageMode::Api,
            response_time_ms: 100,
        }
    }

    fn enforcer(config: QuotaConfig) -> QuotaEnforcer<MemoryUsageLedger, ManualClock> {
        let start = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        QuotaEnforcer::new(
            MemoryUsageLedger::new(),
            ManualClock::new(start),
            config,
            Arc::new(EventBus::default()),
        )
    }

    /// Append `n` events at the enforcer's current time.
    async fn seed(e: &QuotaEnforcer<MemoryUsageLedger, ManualClock>, n: usize, user_id: DbId) {
        for _ in 0..n {
            e.record_usage(usage(TENANT, user_id)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn nine_events_in_the_hour_leave_one() {
        let e = enforcer(QuotaConfig::default());
        seed(&e, 9, USER).await;
        let decision = e.check_limit(USER, TENANT).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(1));
    }

    #[tokio::test]
    async fn tenth_event_in_the_hour_denies() {
        let e = enforcer(QuotaConfig::default());
        seed(&e, 10, USER).await;
        let decision = e.check_limit(USER, TENANT).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, Some(0));
        assert!(decision.reason.unwrap().contains("Hourly"));
    }

    #[tokio::test]
    async fn hourly_window_slides() {
        let e = enforcer(QuotaConfig::default());
        seed(&e, 10, USER).await;
        e.clock().advance(Duration::minutes(61));
        let decision = e.check_limit(USER, TENANT).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(10));
    }

    #[tokio::test]
    async fn hourly_cap_is_per_actor() {
        let e = enforcer(QuotaConfig::default());
        seed(&e, 10, USER).await;
        assert!(e.check_limit(USER + 1, TENANT).await.allowed);
    }

    #[tokio::test]
    async fn monthly_boundary() {
        let limits = QuotaLimits {
            hourly_limit: 10_000,
            ..QuotaLimits::default()
        };
        let e = enforcer(QuotaConfig {
            defaults: limits,
            ..QuotaConfig::default()
        });
        seed(&e, 999, USER).await;
        assert!(e.check_limit(USER, TENANT).await.allowed);

        seed(&e, 1, USER).await;
        let decision = e.check_limit(USER, TENANT).await;
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("Monthly"));
    }

    #[tokio::test]
    async fn monthly_window_resets_on_the_first() {
        let limits = QuotaLimits {
            hourly_limit: 10_000,
            monthly_limit: 20,
            warning_threshold: 10,
            warning_band: 2,
        };
        let e = enforcer(QuotaConfig {
            defaults: limits,
            ..QuotaConfig::default()
        });
        seed(&e, 20, USER).await;
        assert!(!e.check_limit(USER, TENANT).await.allowed);

        e.clock()
            .set(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
        assert!(e.check_limit(USER, TENANT).await.allowed);
    }

    /// An actor with 9 events in the last hour is admitted once, then
    /// denied after one more, then admitted again an hour later.
    #[tokio::test]
    async fn hourly_scenario_with_manual_clock() {
        let e = enforcer(QuotaConfig::default());
        seed(&e, 9, USER).await;

        let first = e.check_limit(USER, TENANT).await;
        assert_eq!(first, QuotaDecision::allowed(1));
        e.record_usage(usage(TENANT, USER)).await;

        e.clock().advance(Duration::minutes(5));
        assert!(!e.check_limit(USER, TENANT).await.allowed);

        e.clock().advance(Duration::minutes(56));
        assert!(e.check_limit(USER, TENANT).await.allowed);
    }

    #[tokio::test]
    async fn tenant_override_applies() {
        let strict = QuotaLimits {
            hourly_limit: 2,
            ..QuotaLimits::default()
        };
        let e = enforcer(QuotaConfig::default().with_override(TENANT, strict));
        seed(&e, 2, USER).await;
        assert!(!e.check_limit(USER, TENANT).await.allowed);
    }

    #[tokio::test]
    async fn warning_fires_once_per_month() {
        let limits = QuotaLimits {
            hourly_limit: 10_000,
            monthly_limit: 100,
            warning_threshold: 5,
            warning_band: 3,
        };
        let e = enforcer(QuotaConfig {
            defaults: limits,
            ..QuotaConfig::default()
        });
        let mut rx = e.event_bus.subscribe();

        seed(&e, 5, USER).await;
        e.check_limit(USER, TENANT).await;
        seed(&e, 1, USER).await;
        e.check_limit(USER, TENANT).await;

        let event = rx.try_recv().expect("warning should be published");
        assert_eq!(event.event_type, event_types::QUOTA_WARNING_THRESHOLD_REACHED);
        assert_eq!(event.tenant_id, TENANT);
        assert_eq!(event.payload["monthly_count"], 5);
        assert!(rx.try_recv().is_err(), "warning must not repeat");
    }

    #[tokio::test]
    async fn warnings_from_previous_months_are_forgotten() {
        let limits = QuotaLimits {
            hourly_limit: 10_000,
            monthly_limit: 100,
            warning_threshold: 5,
            warning_band: 3,
        };
        let e = enforcer(QuotaConfig {
            defaults: limits,
            ..QuotaConfig::default()
        });
        let mut rx = e.event_bus.subscribe();

        seed(&e, 5, USER).await;
        e.check_limit(USER, TENANT).await;
        assert_eq!(rx.try_recv().unwrap().payload["month"], 3);

        e.clock().set(Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).unwrap());
        seed(&e, 5, USER).await;
        e.check_limit(USER, TENANT).await;
        assert_eq!(rx.try_recv().unwrap().payload["month"], 4);

        let warned = e.warned.lock().unwrap();
        assert_eq!(warned.len(), 1);
        assert!(warned.contains(&(TENANT, 2026, 4)));
    }

    #[tokio::test]
    async fn no_warning_outside_band() {
        let limits = QuotaLimits {
            hourly_limit: 10_000,
            monthly_limit: 100,
            warning_threshold: 5,
            warning_band: 3,
        };
        let e = enforcer(QuotaConfig {
            defaults: limits,
            ..QuotaConfig::default()
        });
        let mut rx = e.event_bus.subscribe();
        seed(&e, 8, USER).await;
        e.check_limit(USER, TENANT).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fail_open_admits_when_ledger_down() {
        let e = enforcer(QuotaConfig::default());
        e.ledger().set_unavailable(true);
        let decision = e.check_limit(USER, TENANT).await;
        assert_eq!(decision, QuotaDecision::allowed_unchecked());
    }

    #[tokio::test]
    async fn fail_closed_denies_when_ledger_down() {
        let e = enforcer(QuotaConfig {
            failure_policy: FailurePolicy::FailClosed,
            ..QuotaConfig::default()
        });
        e.ledger().set_unavailable(true);
        let decision = e.check_limit(USER, TENANT).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some(UNAVAILABLE_REASON));
    }

    #[tokio::test]
    async fn record_usage_swallows_failures() {
        let e = enforcer(QuotaConfig::default());
        e.ledger().set_unavailable(true);
        assert_eq!(e.record_usage(usage(TENANT, USER)).await, None);
    }

    #[tokio::test]
    async fn satisfaction_is_clamped() {
        let e = enforcer(QuotaConfig::default());
        let low = e.record_usage(usage(TENANT, USER)).await.unwrap();
        let high = e.record_usage(usage(TENANT, USER)).await.unwrap();

        assert_eq!(e.update_satisfaction(TENANT, low, 0).await.unwrap(), 1);
        assert_eq!(e.update_satisfaction(TENANT, high, 9).await.unwrap(), 5);
        assert_eq!(e.ledger().satisfaction_of(low), Some(1));
        assert_eq!(e.ledger().satisfaction_of(high), Some(5));
    }

    #[tokio::test]
    async fn satisfaction_for_foreign_entry_is_not_found() {
        let e = enforcer(QuotaConfig::default());
        let id = e.record_usage(usage(TENANT, USER)).await.unwrap();
        assert_matches!(
            e.update_satisfaction(TENANT + 1, id, 3).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn organization_stats_summarize_month() {
        let e = enforcer(QuotaConfig::default());
        seed(&e, 3, USER).await;
        seed(&e, 1, USER + 1).await;
        let id = e.record_usage(usage(TENANT, USER + 1)).await.unwrap();
        e.update_satisfaction(TENANT, id, 4).await.unwrap();

        let stats = e.get_organization_stats(TENANT).await.unwrap();
        assert_eq!(stats.monthly.total_requests, 5);
        assert_eq!(stats.monthly.month, 3);
        assert_eq!(stats.top_users[0].user_id, USER);
        assert_eq!(stats.top_users[0].requests, 3);
        assert_eq!(stats.average_satisfaction, Some(4.0));
        assert_eq!(stats.monthly_remaining, 995);
        assert_eq!(stats.limits, QuotaLimits::default());
    }

    #[tokio::test]
    async fn monthly_usage_ignores_previous_month() {
        let e = enforcer(QuotaConfig::default());
        seed(&e, 2, USER).await;
        e.clock()
            .set(Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap());
        seed(&e, 1, USER).await;

        let usage = e.get_monthly_usage(TENANT).await.unwrap();
        assert_eq!(usage.total_requests, 1);
        assert_eq!((usage.year, usage.month), (2026, 4));
    }
}
