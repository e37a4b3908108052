//! Access-token validation. Tokens are issued by the identity provider; the
//! generator here exists for tooling and tests.

pub mod jwt;
