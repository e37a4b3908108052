//! Route definitions for the assistant usage quota.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::assistant_usage;
use crate::state::AppState;

/// Routes mounted at `/assistant/usage`.
///
/// ```text
/// POST   /                     -> record
/// POST   /check                -> check
/// GET    /monthly              -> monthly
/// GET    /stats                -> stats
/// PUT    /{id}/satisfaction    -> satisfaction
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(assistant_usage::record))
        .route("/check", post(assistant_usage::check))
        .route("/monthly", get(assistant_usage::monthly))
        .route("/stats", get(assistant_usage::stats))
        .route("/{id}/satisfaction", put(assistant_usage::satisfaction))
}
