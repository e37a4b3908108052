//! Route definitions for hierarchical process records.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::process_record;
use crate::state::AppState;

/// Routes mounted at `/process-records`.
///
/// ```text
/// GET    /                          -> list (?state=&order=)
/// POST   /                          -> create
/// GET    /stats                     -> stats
/// GET    /{id}                      -> get_by_id
/// PUT    /{id}                      -> update
/// DELETE /{id}                      -> archive
/// POST   /{id}/state                -> change_state
/// GET    /{id}/sub-records          -> sub_records
/// GET    /{id}/hierarchy            -> hierarchy
/// POST   /{id}/comments             -> add_comment
/// POST   /{id}/checklist            -> add_checklist_item
/// PUT    /{id}/checklist/{item_id}  -> toggle_checklist_item
/// POST   /{id}/attachments          -> add_attachment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(process_record::list).post(process_record::create))
        .route("/stats", get(process_record::stats))
        .route(
            "/{id}",
            get(process_record::get_by_id)
                .put(process_record::update)
                .delete(process_record::archive),
        )
        .route("/{id}/state", post(process_record::change_state))
        .route("/{id}/sub-records", get(process_record::sub_records))
        .route("/{id}/hierarchy", get(process_record::hierarchy))
        .route("/{id}/comments", post(process_record::add_comment))
        .route("/{id}/checklist", post(process_record::add_checklist_item))
        .route(
            "/{id}/checklist/{item_id}",
            put(process_record::toggle_checklist_item),
        )
        .route("/{id}/attachments", post(process_record::add_attachment))
}
