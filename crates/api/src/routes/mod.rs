pub mod assistant_usage;
pub mod health;
pub mod process_definition;
pub mod process_record;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /process-definitions                                   list, create (admin)
/// /process-definitions/{id}                              get, update, archive (admin)
/// /process-definitions/{id}/stages                       replace stage graph (admin)
/// /process-definitions/{id}/records                      list, create
/// /process-definitions/{id}/records/{record_id}          update, remove
/// /process-definitions/{id}/records/{record_id}/move     move to stage
///
/// /process-records                                       list (?state=&order=), create
/// /process-records/stats                                 counts per state
/// /process-records/{id}                                  get, update, archive
/// /process-records/{id}/state                            change state
/// /process-records/{id}/sub-records                      direct children
/// /process-records/{id}/hierarchy                        nested tree
/// /process-records/{id}/comments                         add comment
/// /process-records/{id}/checklist                        add item
/// /process-records/{id}/checklist/{item_id}              toggle item
/// /process-records/{id}/attachments                      attach file metadata
///
/// /assistant/usage                                       record usage
/// /assistant/usage/check                                 quota check
/// /assistant/usage/monthly                               current month totals
/// /assistant/usage/stats                                 organization dashboard
/// /assistant/usage/{id}/satisfaction                     rate an answer
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/process-definitions", process_definition::router())
        .nest("/process-records", process_record::router())
        .nest("/assistant/usage", assistant_usage::router())
}
