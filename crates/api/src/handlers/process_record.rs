//! Handlers for the `/process-records` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use qms_core::hierarchy::RecordTree;
use qms_core::process_record::{Attachment, ChecklistItem, RecordComment};
use qms_core::types::DbId;
use qms_db::models::process_record::{
    AddAttachmentRequest, AddChecklistItemRequest, AddCommentRequest, ChangeStateRequest,
    CreateProcessRecord, ProcessRecord, RecordListQuery, RecordStateCount,
    ToggleChecklistItemRequest, UpdateProcessRecord,
};
use qms_db::repositories::ProcessRecordRepo;
use uuid::Uuid;

use crate::engine::process_records as engine;
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/process-records?state=&order=
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RecordListQuery>,
) -> AppResult<Json<DataResponse<Vec<ProcessRecord>>>> {
    let records = match query.state {
        Some(record_state) => {
            ProcessRecordRepo::list_by_state(&state.pool, user.tenant_id, record_state, query.order)
                .await?
        }
        None => {
            ProcessRecordRepo::list_by_organization(&state.pool, user.tenant_id, query.order)
                .await?
        }
    };
    Ok(Json(DataResponse::new(records)))
}

/// POST /api/v1/process-records
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateProcessRecord>,
) -> AppResult<(StatusCode, Json<DataResponse<ProcessRecord>>)> {
    let record = engine::create(&state.pool, &state.event_bus, &user, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(record))))
}

/// GET /api/v1/process-records/stats
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<Vec<RecordStateCount>>>> {
    let stats = ProcessRecordRepo::stats(&state.pool, user.tenant_id).await?;
    Ok(Json(DataResponse::new(stats)))
}

/// GET /api/v1/process-records/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProcessRecord>>> {
    let record = engine::load(&state.pool, user.tenant_id, id).await?;
    Ok(Json(DataResponse::new(record)))
}

/// PUT /api/v1/process-records/{id}
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateProcessRecord>,
) -> AppResult<Json<DataResponse<ProcessRecord>>> {
    let record = engine::update(&state.pool, &user, id, input).await?;
    Ok(Json(DataResponse::new(record)))
}

/// DELETE /api/v1/process-records/{id}
pub async fn archive(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    engine::archive(&state.pool, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/process-records/{id}/state
pub async fn change_state(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<ChangeStateRequest>,
) -> AppResult<Json<DataResponse<ProcessRecord>>> {
    let record = engine::change_state(&state.pool, &state.event_bus, &user, id, input).await?;
    Ok(Json(DataResponse::new(record)))
}

/// GET /api/v1/process-records/{id}/sub-records
pub async fn sub_records(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<ProcessRecord>>>> {
    let records = engine::sub_records(&state.pool, user.tenant_id, id).await?;
    Ok(Json(DataResponse::new(records)))
}

/// GET /api/v1/process-records/{id}/hierarchy
pub async fn hierarchy(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<RecordTree<ProcessRecord>>>> {
    let tree = engine::hierarchy(&state.pool, user.tenant_id, id).await?;
    Ok(Json(DataResponse::new(tree)))
}

/// POST /api/v1/process-records/{id}/comments
pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<AddCommentRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<RecordComment>>)> {
    let comment = engine::add_comment(&state.pool, &user, id, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(comment))))
}

/// POST /api/v1/process-records/{id}/checklist
pub async fn add_checklist_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<AddChecklistItemRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ChecklistItem>>)> {
    let item = engine::add_checklist_item(&state.pool, &user, id, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(item))))
}

/// PUT /api/v1/process-records/{id}/checklist/{item_id}
pub async fn toggle_checklist_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(DbId, Uuid)>,
    Json(input): Json<ToggleChecklistItemRequest>,
) -> AppResult<Json<DataResponse<ChecklistItem>>> {
    let item = engine::toggle_checklist_item(&state.pool, &user, id, item_id, input.done).await?;
    Ok(Json(DataResponse::new(item)))
}

/// POST /api/v1/process-records/{id}/attachments
pub async fn add_attachment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<AddAttachmentRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Attachment>>)> {
    let attachment = engine::add_attachment(&state.pool, &user, id, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(attachment))))
}
