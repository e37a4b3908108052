//! Route definitions for process definitions and their embedded records.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::process_definition;
use crate::state::AppState;

/// Routes mounted at `/process-definitions`.
///
/// ```text
/// GET    /                                -> list
/// POST   /                                -> create (admin)
/// GET    /{id}                            -> get_by_id
/// PUT    /{id}                            -> update (admin)
/// DELETE /{id}                            -> archive (admin)
/// PUT    /{id}/stages                     -> replace_stages (admin)
/// GET    /{id}/records                    -> list_records
/// POST   /{id}/records                    -> create_record
/// PUT    /{id}/records/{record_id}        -> update_record
/// DELETE /{id}/records/{record_id}        -> remove_record
/// POST   /{id}/records/{record_id}/move   -> move_record
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(process_definition::list).post(process_definition::create),
        )
        .route(
            "/{id}",
            get(process_definition::get_by_id)
                .put(process_definition::update)
                .delete(process_definition::archive),
        )
        .route("/{id}/stages", put(process_definition::replace_stages))
        .route(
            "/{id}/records",
            get(process_definition::list_records).post(process_definition::create_record),
        )
        .route(
            "/{id}/records/{record_id}",
            put(process_definition::update_record).delete(process_definition::remove_record),
        )
        .route(
            "/{id}/records/{record_id}/move",
            post(process_definition::move_record),
        )
}
