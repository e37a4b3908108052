//! QMS API server library.
//!
//! Exposes config, state, error handling, the lifecycle engine, the quota
//! enforcer and routes so integration tests and the binary entrypoint can
//! both access them.

pub mod auth;
pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod quota;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
