//! Usage quota enforcement for the assistant feature.

pub mod enforcer;

pub use enforcer::{QuotaEnforcer, UNAVAILABLE_REASON};
