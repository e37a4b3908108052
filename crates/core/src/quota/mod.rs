//! Usage quota limits, windows and admission decisions for the metered
//! assistant feature.
//!
//! Two independent windows are checked:
//!
//! - **hourly**, per actor: a sliding 60-minute window ending at "now";
//! - **monthly**, per tenant: calendar-aligned, from 00:00 UTC on the 1st.
//!
//! The decision logic here is pure. Counting happens through a
//! [`UsageLedger`]; orchestration (one-shot warnings, failure policy) lives
//! in the API crate's enforcer.

pub mod ledger;
pub mod memory;

use std::collections::HashMap;

use chrono::{Datelike, Days, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

pub use ledger::{
    ActorUsage, ModuleUsage, MonthlyUsage, NewUsageEvent, OrganizationUsageStats, UsageLedger,
    UsageMode, UsageTotals,
};
pub use memory::MemoryUsageLedger;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default events per actor per sliding hour.
pub const DEFAULT_HOURLY_LIMIT: i64 = 10;

/// Default events per tenant per calendar month.
pub const DEFAULT_MONTHLY_LIMIT: i64 = 1000;

/// Default monthly count at which administrators are warned.
pub const DEFAULT_WARNING_THRESHOLD: i64 = 500;

/// Width of the band above the threshold in which the warning may fire.
pub const DEFAULT_WARNING_BAND: i64 = 10;

/// Length of the sliding per-actor window.
pub const HOURLY_WINDOW_MINUTES: i64 = 60;

/// Days a usage event is kept before the retention job purges it.
pub const DEFAULT_USAGE_RETENTION_DAYS: i64 = 90;

/// Number of actors reported in organization statistics.
pub const TOP_ACTORS_LIMIT: i64 = 5;

/// Lowest satisfaction rating.
pub const MIN_SATISFACTION: i16 = 1;

/// Highest satisfaction rating.
pub const MAX_SATISFACTION: i16 = 5;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Caps applied to one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub hourly_limit: i64,
    pub monthly_limit: i64,
    pub warning_threshold: i64,
    pub warning_band: i64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            hourly_limit: DEFAULT_HOURLY_LIMIT,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            warning_band: DEFAULT_WARNING_BAND,
        }
    }
}

impl QuotaLimits {
    /// Validate that caps are positive and the warning sits below the cap.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.hourly_limit <= 0 || self.monthly_limit <= 0 {
            return Err(CoreError::Validation(
                "Quota limits must be positive".into(),
            ));
        }
        if self.warning_band <= 0 {
            return Err(CoreError::Validation(
                "Quota warning band must be positive".into(),
            ));
        }
        if self.warning_threshold < 0 || self.warning_threshold >= self.monthly_limit {
            return Err(CoreError::Validation(format!(
                "Quota warning threshold {} must be between 0 and the monthly limit {}",
                self.warning_threshold, self.monthly_limit
            )));
        }
        Ok(())
    }
}

crate::define_text_enum! {
    /// What the enforcer does when the ledger cannot be read.
    FailurePolicy {
        /// Admit the action and log the error.
        FailOpen = "fail_open",
        /// Deny the action.
        FailClosed = "fail_closed",
    }
}

/// Quota configuration injected into the enforcer.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaConfig {
    pub defaults: QuotaLimits,
    pub tenant_overrides: HashMap<DbId, QuotaLimits>,
    pub failure_policy: FailurePolicy,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            defaults: QuotaLimits::default(),
            tenant_overrides: HashMap::new(),
            failure_policy: FailurePolicy::FailOpen,
        }
    }
}

impl QuotaConfig {
    /// Limits in effect for `tenant_id`.
    pub fn limits_for(&self, tenant_id: DbId) -> QuotaLimits {
        self.tenant_overrides
            .get(&tenant_id)
            .copied()
            .unwrap_or(self.defaults)
    }

    /// Builder-style per-tenant override.
    pub fn with_override(mut self, tenant_id: DbId, limits: QuotaLimits) -> Self {
        self.tenant_overrides.insert(tenant_id, limits);
        self
    }

    /// Validate defaults and every override.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.defaults.validate()?;
        for (tenant, limits) in &self.tenant_overrides {
            limits.validate().map_err(|e| {
                CoreError::Validation(format!("Override for tenant {tenant}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Parse `QUOTA_TENANT_OVERRIDES`-style text: `tenant:hourly:monthly` entries
/// separated by commas. Warning settings are inherited from `defaults`.
pub fn parse_tenant_overrides(
    raw: &str,
    defaults: QuotaLimits,
) -> Result<HashMap<DbId, QuotaLimits>, CoreError> {
    let mut overrides = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        let [tenant, hourly, monthly] = parts.as_slice() else {
            return Err(CoreError::Validation(format!(
                "Invalid quota override '{entry}'. Expected tenant:hourly:monthly"
            )));
        };
        let parse = |v: &str| {
            v.parse::<i64>().map_err(|_| {
                CoreError::Validation(format!("Invalid number '{v}' in quota override '{entry}'"))
            })
        };
        let limits = QuotaLimits {
            hourly_limit: parse(hourly)?,
            monthly_limit: parse(monthly)?,
            ..defaults
        };
        overrides.insert(parse(tenant)?, limits);
    }
    Ok(overrides)
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// Start of the sliding hourly window ending at `now`.
pub fn hourly_window_start(now: Timestamp) -> Timestamp {
    now - chrono::Duration::minutes(HOURLY_WINDOW_MINUTES)
}

/// First instant (UTC) of the calendar month containing `now`.
pub fn month_start(now: Timestamp) -> Timestamp {
    let first = now.date_naive() - Days::new(u64::from(now.day0()));
    first.and_time(NaiveTime::MIN).and_utc()
}

/// Events created before this instant are past retention.
pub fn retention_cutoff(now: Timestamp, retention_days: i64) -> Timestamp {
    now - chrono::Duration::days(retention_days)
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Result of an admission check, serialized as-is to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
}

impl QuotaDecision {
    pub fn allowed(remaining: i64) -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining: Some(remaining),
        }
    }

    /// Admitted without counting (ledger unavailable under fail-open).
    pub fn allowed_unchecked() -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            remaining: Some(0),
        }
    }
}

/// Which window rejected the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    Hourly,
    Monthly,
}

/// Full outcome of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaEvaluation {
    pub decision: QuotaDecision,
    pub denied_by: Option<QuotaWindow>,
    /// The monthly count sits in the warning band.
    pub warn: bool,
}

/// Decide admission from the two window counts.
///
/// The hourly window is checked first; the warning band is only considered
/// for admitted actions.
pub fn evaluate(limits: &QuotaLimits, hourly_count: i64, monthly_count: i64) -> QuotaEvaluation {
    if hourly_count >= limits.hourly_limit {
        return QuotaEvaluation {
            decision: QuotaDecision::denied(format!(
                "Hourly limit of {} requests reached. Try again later.",
                limits.hourly_limit
            )),
            denied_by: Some(QuotaWindow::Hourly),
            warn: false,
        };
    }

    if monthly_count >= limits.monthly_limit {
        return QuotaEvaluation {
            decision: QuotaDecision::denied(format!(
                "Monthly organization limit of {} requests reached.",
                limits.monthly_limit
            )),
            denied_by: Some(QuotaWindow::Monthly),
            warn: false,
        };
    }

    QuotaEvaluation {
        decision: QuotaDecision::allowed(limits.hourly_limit - hourly_count),
        denied_by: None,
        warn: in_warning_band(limits, monthly_count),
    }
}

/// Whether `monthly_count` lies in `[threshold, threshold + band)`.
pub fn in_warning_band(limits: &QuotaLimits, monthly_count: i64) -> bool {
    monthly_count >= limits.warning_threshold
        && monthly_count < limits.warning_threshold + limits.warning_band
}

/// Clamp a satisfaction rating into `[MIN_SATISFACTION, MAX_SATISFACTION]`.
pub fn clamp_satisfaction(rating: i32) -> i16 {
    rating.clamp(i32::from(MIN_SATISFACTION), i32::from(MAX_SATISFACTION)) as i16
}
