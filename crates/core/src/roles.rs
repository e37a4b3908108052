//! Role names carried in access tokens.

/// Tenant administrator: manages process definitions.
pub const ROLE_ADMIN: &str = "admin";

/// Regular tenant member.
pub const ROLE_MEMBER: &str = "member";
