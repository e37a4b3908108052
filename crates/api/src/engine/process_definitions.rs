//! Process definitions and the embedded-record lifecycle.
//!
//! Every mutation follows the same protocol: load the definition, apply the
//! pure transformation from `qms_core`, then save the whole document with a
//! compare-and-swap on `version`. A lost race surfaces as `Conflict`.

use qms_core::embedded_record::{
    self, EmbeddedRecord, EmbeddedRecordChanges, NewEmbeddedRecord,
};
use qms_core::error::CoreError;
use qms_core::process::{validate_process_code, validate_process_name};
use qms_core::stage_graph::{self, Stage};
use qms_core::types::DbId;
use qms_db::models::process_definition::{
    CreateProcessDefinition, ProcessDefinition, UpdateProcessDefinition,
};
use qms_db::repositories::ProcessDefinitionRepo;
use qms_db::DbPool;
use qms_events::{event_types, EventBus, PlatformEvent};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;

const ENTITY: &str = "ProcessDefinition";

fn concurrent_modification() -> AppError {
    AppError::Core(CoreError::Conflict(
        "The process definition was modified concurrently; reload and retry".into(),
    ))
}

/// Load a visible definition of the caller's tenant.
pub async fn load(pool: &DbPool, tenant_id: DbId, id: DbId) -> AppResult<ProcessDefinition> {
    ProcessDefinitionRepo::find_by_id(pool, tenant_id, id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found(ENTITY, id)))
}

pub async fn create(
    pool: &DbPool,
    user: &AuthUser,
    input: CreateProcessDefinition,
) -> AppResult<ProcessDefinition> {
    input.validate()?;
    validate_process_code(&input.code)?;
    validate_process_name(&input.name)?;
    stage_graph::validate_stages(&input.stages)?;

    let definition = ProcessDefinitionRepo::create(pool, user.tenant_id, user.user_id, &input).await?;
    tracing::info!(
        tenant_id = user.tenant_id,
        definition_id = definition.id,
        code = %definition.code,
        "Process definition created"
    );
    Ok(definition)
}

pub async fn update(
    pool: &DbPool,
    user: &AuthUser,
    id: DbId,
    input: UpdateProcessDefinition,
) -> AppResult<ProcessDefinition> {
    input.validate()?;
    if let Some(name) = &input.name {
        validate_process_name(name)?;
    }
    ProcessDefinitionRepo::update(pool, user.tenant_id, id, user.user_id, &input)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found(ENTITY, id)))
}

/// Replace the stage graph. Stages that still hold records cannot be
/// dropped.
pub async fn replace_stages(
    pool: &DbPool,
    user: &AuthUser,
    id: DbId,
    stages: Vec<Stage>,
) -> AppResult<ProcessDefinition> {
    stage_graph::validate_stages(&stages)?;
    let definition = load(pool, user.tenant_id, id).await?;

    let stranded = embedded_record::records_without_stage(&stages, &definition.records.0);
    if !stranded.is_empty() {
        let ids: Vec<&str> = stranded.iter().map(|r| r.stage_id.as_str()).collect();
        return Err(AppError::Core(CoreError::Validation(format!(
            "Stages still in use by records cannot be removed: {}",
            ids.join(", ")
        ))));
    }

    let saved = ProcessDefinitionRepo::save_document(
        pool,
        user.tenant_id,
        id,
        definition.version,
        &stages,
        &definition.records.0,
        user.user_id,
    )
    .await?
    .ok_or_else(concurrent_modification)?;
    tracing::info!(tenant_id = user.tenant_id, definition_id = id, stages = stages.len(), "Stages replaced");
    Ok(saved)
}

pub async fn archive(pool: &DbPool, user: &AuthUser, id: DbId) -> AppResult<()> {
    if ProcessDefinitionRepo::archive(pool, user.tenant_id, id, user.user_id).await? {
        tracing::info!(tenant_id = user.tenant_id, definition_id = id, "Process definition archived");
        Ok(())
    } else {
        Err(AppError::Core(CoreError::not_found(ENTITY, id)))
    }
}

/// Persist `records` against the version `definition` was read at.
async fn save_records(
    pool: &DbPool,
    user: &AuthUser,
    definition: &ProcessDefinition,
    records: &[EmbeddedRecord],
) -> AppResult<ProcessDefinition> {
    ProcessDefinitionRepo::save_document(
        pool,
        user.tenant_id,
        definition.id,
        definition.version,
        &definition.stages.0,
        records,
        user.user_id,
    )
    .await?
    .ok_or_else(concurrent_modification)
}

/// Create an embedded record in the definition's initial stage.
pub async fn create_record(
    pool: &DbPool,
    events: &EventBus,
    user: &AuthUser,
    definition_id: DbId,
    input: NewEmbeddedRecord,
) -> AppResult<EmbeddedRecord> {
    let definition = load(pool, user.tenant_id, definition_id).await?;
    let mut records = definition.records.0.clone();
    let record = embedded_record::create_record(
        &definition.stages.0,
        &mut records,
        definition.allows_records,
        input,
        chrono::Utc::now(),
    )?;
    save_records(pool, user, &definition, &records).await?;

    tracing::info!(
        tenant_id = user.tenant_id,
        definition_id,
        record_id = %record.id,
        stage_id = %record.stage_id,
        "Embedded record created"
    );
    events.publish(
        PlatformEvent::new(event_types::EMBEDDED_RECORD_CREATED, user.tenant_id)
            .with_source("process_definition", definition_id)
            .with_actor(user.user_id)
            .with_payload(serde_json::json!({
                "record_id": record.id,
                "stage_id": record.stage_id,
            })),
    );
    Ok(record)
}

/// Move an embedded record to the stage with id `target_stage_id`.
pub async fn move_record(
    pool: &DbPool,
    events: &EventBus,
    user: &AuthUser,
    definition_id: DbId,
    record_id: Uuid,
    target_stage_id: &str,
) -> AppResult<EmbeddedRecord> {
    let definition = load(pool, user.tenant_id, definition_id).await?;
    let mut records = definition.records.0.clone();
    let from_stage = records
        .iter()
        .find(|r| r.id == record_id)
        .map(|r| r.stage_id.clone());
    let record = embedded_record::move_record(
        &definition.stages.0,
        &mut records,
        record_id,
        target_stage_id,
        chrono::Utc::now(),
    )?;
    save_records(pool, user, &definition, &records).await?;

    tracing::info!(
        tenant_id = user.tenant_id,
        definition_id,
        record_id = %record_id,
        stage_id = %record.stage_id,
        "Record moved"
    );
    events.publish(
        PlatformEvent::new(event_types::EMBEDDED_RECORD_MOVED, user.tenant_id)
            .with_source("process_definition", definition_id)
            .with_actor(user.user_id)
            .with_payload(serde_json::json!({
                "record_id": record_id,
                "from_stage_id": from_stage,
                "to_stage_id": record.stage_id,
                "progress": record.progress,
            })),
    );
    Ok(record)
}

pub async fn update_record(
    pool: &DbPool,
    user: &AuthUser,
    definition_id: DbId,
    record_id: Uuid,
    changes: EmbeddedRecordChanges,
) -> AppResult<EmbeddedRecord> {
    let definition = load(pool, user.tenant_id, definition_id).await?;
    let mut records = definition.records.0.clone();
    let record = embedded_record::update_record(
        &definition.stages.0,
        &mut records,
        record_id,
        changes,
        chrono::Utc::now(),
    )?;
    save_records(pool, user, &definition, &records).await?;
    Ok(record)
}

/// Remove an embedded record. An absent record is not an error; the
/// definition is saved either way.
pub async fn remove_record(
    pool: &DbPool,
    user: &AuthUser,
    definition_id: DbId,
    record_id: Uuid,
) -> AppResult<()> {
    let definition = load(pool, user.tenant_id, definition_id).await?;
    let mut records = definition.records.0.clone();
    let removed = embedded_record::remove_record(&mut records, record_id);
    save_records(pool, user, &definition, &records).await?;
    if removed {
        tracing::info!(tenant_id = user.tenant_id, definition_id, record_id = %record_id, "Embedded record removed");
    }
    Ok(())
}
