//! Hierarchical record lifecycle: creation with computed level and code,
//! state changes, and the embedded audit documents.

use chrono::Utc;
use qms_core::codes::{code_year, format_record_code, validate_record_code};
use qms_core::embedded_record::validate_progress;
use qms_core::error::CoreError;
use qms_core::hierarchy::{build_tree, RecordTree};
use qms_core::process_record::{
    self, apply_state_change, child_level, initial_history, Attachment, ChecklistItem,
    RecordComment,
};
use qms_core::types::DbId;
use qms_db::models::process_record::{
    AddAttachmentRequest, AddChecklistItemRequest, AddCommentRequest, ChangeStateRequest,
    CreateProcessRecord, ProcessRecord, UpdateProcessRecord,
};
use qms_db::repositories::{
    NewRecordRow, ProcessDefinitionRepo, ProcessRecordRepo, RecordCodeSequenceRepo,
};
use qms_db::DbPool;
use qms_events::{event_types, EventBus, PlatformEvent};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;

const ENTITY: &str = "ProcessRecord";

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::not_found(ENTITY, id))
}

fn concurrent_modification() -> AppError {
    AppError::Core(CoreError::Conflict(
        "The record was modified concurrently; reload and retry".into(),
    ))
}

pub async fn load(pool: &DbPool, tenant_id: DbId, id: DbId) -> AppResult<ProcessRecord> {
    ProcessRecordRepo::find_by_id(pool, tenant_id, id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// Create a record.
///
/// Parent lookup, level computation, code allocation and the insert run in
/// one transaction with the parent row share-locked, so a parent cannot be
/// archived mid-creation and two creators never draw the same code.
pub async fn create(
    pool: &DbPool,
    events: &EventBus,
    user: &AuthUser,
    input: CreateProcessRecord,
) -> AppResult<ProcessRecord> {
    input.validate()?;
    if let Some(code) = &input.code {
        validate_record_code(code)?;
    }
    if let Some(progress) = input.progress {
        validate_progress(progress)?;
    }
    if let Some(definition_id) = input.process_definition_id {
        if ProcessDefinitionRepo::find_by_id(pool, user.tenant_id, definition_id)
            .await?
            .is_none()
        {
            return Err(AppError::Core(CoreError::not_found(
                "ProcessDefinition",
                definition_id,
            )));
        }
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let parent_level = match input.parent_id {
        Some(parent_id) => Some(
            ProcessRecordRepo::lock_parent_level(&mut tx, user.tenant_id, parent_id)
                .await?
                .ok_or_else(|| not_found(parent_id))?,
        ),
        None => None,
    };
    let level = child_level(parent_level)?;

    let code = match &input.code {
        Some(code) => code.clone(),
        None => {
            let year = code_year(now);
            let seq = RecordCodeSequenceRepo::next_value(&mut tx, user.tenant_id, year).await?;
            format_record_code(year, seq)
        }
    };

    let history = initial_history(user.user_id, now);
    let record = ProcessRecordRepo::insert(
        &mut tx,
        user.tenant_id,
        user.user_id,
        NewRecordRow {
            code: &code,
            level,
            history: &history,
            input: &input,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        tenant_id = user.tenant_id,
        record_id = record.id,
        code = %record.code,
        level = record.level,
        "Process record created"
    );
    events.publish(
        PlatformEvent::new(event_types::PROCESS_RECORD_CREATED, user.tenant_id)
            .with_source("process_record", record.id)
            .with_actor(user.user_id)
            .with_payload(serde_json::json!({
                "code": record.code,
                "parent_id": record.parent_id,
                "level": record.level,
            })),
    );
    Ok(record)
}

/// Move a record to a new state, appending to its history.
pub async fn change_state(
    pool: &DbPool,
    events: &EventBus,
    user: &AuthUser,
    id: DbId,
    request: ChangeStateRequest,
) -> AppResult<ProcessRecord> {
    let record = load(pool, user.tenant_id, id).await?;
    let previous = record.state;
    let change = apply_state_change(
        record.progress,
        record.completed_date,
        request.state,
        user.user_id,
        request.comment,
        Utc::now(),
    );
    let mut history = record.state_history.0;
    history.push(change.entry);

    let saved = ProcessRecordRepo::save_state_change(
        pool,
        user.tenant_id,
        id,
        record.version,
        request.state,
        &history,
        change.progress,
        change.completed_date,
        user.user_id,
    )
    .await?
    .ok_or_else(concurrent_modification)?;

    tracing::info!(
        tenant_id = user.tenant_id,
        record_id = id,
        from = %previous,
        to = %saved.state,
        "Record state changed"
    );
    events.publish(
        PlatformEvent::new(event_types::PROCESS_RECORD_STATE_CHANGED, user.tenant_id)
            .with_source("process_record", id)
            .with_actor(user.user_id)
            .with_payload(serde_json::json!({
                "from": previous,
                "to": saved.state,
            })),
    );
    Ok(saved)
}

pub async fn update(
    pool: &DbPool,
    user: &AuthUser,
    id: DbId,
    input: UpdateProcessRecord,
) -> AppResult<ProcessRecord> {
    input.validate()?;
    if let Some(progress) = input.progress {
        validate_progress(progress)?;
        let current = load(pool, user.tenant_id, id).await?;
        process_record::validate_progress_for_state(current.state, progress)?;
    }
    ProcessRecordRepo::update(pool, user.tenant_id, id, user.user_id, &input)
        .await?
        .ok_or_else(|| not_found(id))
}

pub async fn archive(pool: &DbPool, user: &AuthUser, id: DbId) -> AppResult<()> {
    if ProcessRecordRepo::archive(pool, user.tenant_id, id, user.user_id).await? {
        tracing::info!(tenant_id = user.tenant_id, record_id = id, "Process record archived");
        Ok(())
    } else {
        Err(not_found(id))
    }
}

/// Nested tree of `id` and its visible descendants.
pub async fn hierarchy(
    pool: &DbPool,
    tenant_id: DbId,
    id: DbId,
) -> AppResult<RecordTree<ProcessRecord>> {
    let root = load(pool, tenant_id, id).await?;
    let descendants = ProcessRecordRepo::find_descendants(pool, tenant_id, id).await?;
    Ok(build_tree(root, descendants))
}

pub async fn sub_records(
    pool: &DbPool,
    tenant_id: DbId,
    id: DbId,
) -> AppResult<Vec<ProcessRecord>> {
    // Distinguish "no children" from "no such record".
    load(pool, tenant_id, id).await?;
    Ok(ProcessRecordRepo::find_sub_records(pool, tenant_id, id).await?)
}

// ---------------------------------------------------------------------------
// Embedded audit documents
// ---------------------------------------------------------------------------

/// The three documents rewritten together by [`save_documents`].
struct Documents {
    comments: Vec<RecordComment>,
    checklist: Vec<ChecklistItem>,
    attachments: Vec<Attachment>,
}

impl Documents {
    fn of(record: &ProcessRecord) -> Self {
        Self {
            comments: record.comments.0.clone(),
            checklist: record.checklist.0.clone(),
            attachments: record.attachments.0.clone(),
        }
    }
}

async fn save_documents(
    pool: &DbPool,
    user: &AuthUser,
    record: &ProcessRecord,
    docs: &Documents,
) -> AppResult<ProcessRecord> {
    ProcessRecordRepo::save_documents(
        pool,
        user.tenant_id,
        record.id,
        record.version,
        &docs.comments,
        &docs.checklist,
        &docs.attachments,
        user.user_id,
    )
    .await?
    .ok_or_else(concurrent_modification)
}

pub async fn add_comment(
    pool: &DbPool,
    user: &AuthUser,
    id: DbId,
    request: AddCommentRequest,
) -> AppResult<RecordComment> {
    let record = load(pool, user.tenant_id, id).await?;
    let mut docs = Documents::of(&record);
    process_record::validate_comment(&request.body, request.parent_id, &docs.comments)?;

    let comment = RecordComment {
        id: Uuid::new_v4(),
        parent_id: request.parent_id,
        author_id: user.user_id,
        author_name: user.name.clone(),
        body: request.body.trim().to_string(),
        created_at: Utc::now(),
    };
    docs.comments.push(comment.clone());
    save_documents(pool, user, &record, &docs).await?;
    Ok(comment)
}

pub async fn add_checklist_item(
    pool: &DbPool,
    user: &AuthUser,
    id: DbId,
    request: AddChecklistItemRequest,
) -> AppResult<ChecklistItem> {
    request.validate()?;
    let record = load(pool, user.tenant_id, id).await?;
    let mut docs = Documents::of(&record);

    let item = ChecklistItem {
        id: Uuid::new_v4(),
        text: request.text.trim().to_string(),
        done: false,
        done_by: None,
        done_at: None,
    };
    docs.checklist.push(item.clone());
    save_documents(pool, user, &record, &docs).await?;
    Ok(item)
}

pub async fn toggle_checklist_item(
    pool: &DbPool,
    user: &AuthUser,
    id: DbId,
    item_id: Uuid,
    done: bool,
) -> AppResult<ChecklistItem> {
    let record = load(pool, user.tenant_id, id).await?;
    let mut docs = Documents::of(&record);
    let item = process_record::toggle_checklist_item(
        &mut docs.checklist,
        item_id,
        done,
        user.user_id,
        Utc::now(),
    )?;
    save_documents(pool, user, &record, &docs).await?;
    Ok(item)
}

pub async fn add_attachment(
    pool: &DbPool,
    user: &AuthUser,
    id: DbId,
    request: AddAttachmentRequest,
) -> AppResult<Attachment> {
    request.validate()?;
    let record = load(pool, user.tenant_id, id).await?;
    let mut docs = Documents::of(&record);

    let attachment = Attachment {
        id: Uuid::new_v4(),
        file_name: request.file_name,
        storage_path: request.storage_path,
        content_type: request.content_type,
        size_bytes: request.size_bytes,
        uploaded_by: user.user_id,
        uploaded_at: Utc::now(),
    };
    docs.attachments.push(attachment.clone());
    save_documents(pool, user, &record, &docs).await?;
    tracing::info!(tenant_id = user.tenant_id, record_id = id, file_name = %attachment.file_name, "Attachment added");
    Ok(attachment)
}
