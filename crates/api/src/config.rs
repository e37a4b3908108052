use std::str::FromStr;

use qms_core::quota::{
    parse_tenant_overrides, FailurePolicy, QuotaConfig, QuotaLimits, DEFAULT_HOURLY_LIMIT,
    DEFAULT_MONTHLY_LIMIT, DEFAULT_USAGE_RETENTION_DAYS, DEFAULT_WARNING_BAND,
    DEFAULT_WARNING_THRESHOLD,
};

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background tasks get to stop after the listener closes.
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    /// Assistant usage caps and failure policy.
    pub quota: QuotaConfig,
    /// Usage events older than this many days are purged (default: `90`).
    pub usage_retention_days: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                       |
    /// | `QUOTA_HOURLY_LIMIT`      | `10`                       |
    /// | `QUOTA_MONTHLY_LIMIT`     | `1000`                     |
    /// | `QUOTA_WARNING_THRESHOLD` | `500`                      |
    /// | `QUOTA_WARNING_BAND`      | `10`                       |
    /// | `QUOTA_FAILURE_POLICY`    | `fail_open`                |
    /// | `QUOTA_TENANT_OVERRIDES`  | empty (`tenant:hourly:monthly,...`) |
    /// | `USAGE_RETENTION_DAYS`    | `90`                       |
    ///
    /// # Panics
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_parse("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_parse("SHUTDOWN_TIMEOUT_SECS", 30);
        let usage_retention_days: i64 =
            env_parse("USAGE_RETENTION_DAYS", DEFAULT_USAGE_RETENTION_DAYS);
        assert!(
            usage_retention_days > 0,
            "USAGE_RETENTION_DAYS must be positive"
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            quota: quota_from_env(),
            usage_retention_days,
        }
    }
}

fn quota_from_env() -> QuotaConfig {
    let defaults = QuotaLimits {
        hourly_limit: env_parse("QUOTA_HOURLY_LIMIT", DEFAULT_HOURLY_LIMIT),
        monthly_limit: env_parse("QUOTA_MONTHLY_LIMIT", DEFAULT_MONTHLY_LIMIT),
        warning_threshold: env_parse("QUOTA_WARNING_THRESHOLD", DEFAULT_WARNING_THRESHOLD),
        warning_band: env_parse("QUOTA_WARNING_BAND", DEFAULT_WARNING_BAND),
    };

    let failure_policy = match std::env::var("QUOTA_FAILURE_POLICY") {
        Ok(raw) => FailurePolicy::from_str(raw.trim())
            .unwrap_or_else(|e| panic!("QUOTA_FAILURE_POLICY: {e}")),
        Err(_) => FailurePolicy::FailOpen,
    };

    let tenant_overrides = match std::env::var("QUOTA_TENANT_OVERRIDES") {
        Ok(raw) => parse_tenant_overrides(&raw, defaults)
            .unwrap_or_else(|e| panic!("QUOTA_TENANT_OVERRIDES: {e}")),
        Err(_) => Default::default(),
    };

    let config = QuotaConfig {
        defaults,
        tenant_overrides,
        failure_policy,
    };
    if let Err(e) = config.validate() {
        panic!("Invalid quota configuration: {e}");
    }
    config
}

/// Read and parse an environment variable, falling back to `default` when
/// unset.
fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be valid: {e}")),
        Err(_) => default,
    }
}
