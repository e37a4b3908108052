//! Handlers for the `/process-definitions` resource and its embedded
//! records.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use qms_core::embedded_record::{EmbeddedRecord, EmbeddedRecordChanges, NewEmbeddedRecord};
use qms_core::types::DbId;
use qms_db::models::process_definition::{
    CreateProcessDefinition, MoveRecordRequest, ProcessDefinition, ProcessDefinitionFilter,
    ReplaceStages, UpdateProcessDefinition,
};
use qms_db::repositories::ProcessDefinitionRepo;
use uuid::Uuid;

use crate::engine::process_definitions as engine;
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/process-definitions
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<ProcessDefinitionFilter>,
) -> AppResult<Json<DataResponse<Vec<ProcessDefinition>>>> {
    let definitions = ProcessDefinitionRepo::list(&state.pool, user.tenant_id, &filter).await?;
    Ok(Json(DataResponse::new(definitions)))
}

/// POST /api/v1/process-definitions
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Json(input): Json<CreateProcessDefinition>,
) -> AppResult<(StatusCode, Json<DataResponse<ProcessDefinition>>)> {
    let definition = engine::create(&state.pool, &user, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(definition))))
}

/// GET /api/v1/process-definitions/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProcessDefinition>>> {
    let definition = engine::load(&state.pool, user.tenant_id, id).await?;
    Ok(Json(DataResponse::new(definition)))
}

/// PUT /api/v1/process-definitions/{id}
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateProcessDefinition>,
) -> AppResult<Json<DataResponse<ProcessDefinition>>> {
    let definition = engine::update(&state.pool, &user, id, input).await?;
    Ok(Json(DataResponse::new(definition)))
}

/// DELETE /api/v1/process-definitions/{id}
pub async fn archive(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    engine::archive(&state.pool, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/process-definitions/{id}/stages
pub async fn replace_stages(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<ReplaceStages>,
) -> AppResult<Json<DataResponse<ProcessDefinition>>> {
    let definition = engine::replace_stages(&state.pool, &user, id, input.stages).await?;
    Ok(Json(DataResponse::new(definition)))
}

/// GET /api/v1/process-definitions/{id}/records
pub async fn list_records(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<EmbeddedRecord>>>> {
    let definition = engine::load(&state.pool, user.tenant_id, id).await?;
    Ok(Json(DataResponse::new(definition.records.0)))
}

/// POST /api/v1/process-definitions/{id}/records
pub async fn create_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<NewEmbeddedRecord>,
) -> AppResult<(StatusCode, Json<DataResponse<EmbeddedRecord>>)> {
    let record = engine::create_record(&state.pool, &state.event_bus, &user, id, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(record))))
}

/// PUT /api/v1/process-definitions/{id}/records/{record_id}
pub async fn update_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, record_id)): Path<(DbId, Uuid)>,
    Json(changes): Json<EmbeddedRecordChanges>,
) -> AppResult<Json<DataResponse<EmbeddedRecord>>> {
    let record = engine::update_record(&state.pool, &user, id, record_id, changes).await?;
    Ok(Json(DataResponse::new(record)))
}

/// DELETE /api/v1/process-definitions/{id}/records/{record_id}
pub async fn remove_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, record_id)): Path<(DbId, Uuid)>,
) -> AppResult<StatusCode> {
    engine::remove_record(&state.pool, &user, id, record_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/process-definitions/{id}/records/{record_id}/move
pub async fn move_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, record_id)): Path<(DbId, Uuid)>,
    Json(input): Json<MoveRecordRequest>,
) -> AppResult<Json<DataResponse<EmbeddedRecord>>> {
    let record = engine::move_record(
        &state.pool,
        &state.event_bus,
        &user,
        id,
        record_id,
        &input.stage_id,
    )
    .await?;
    Ok(Json(DataResponse::new(record)))
}
