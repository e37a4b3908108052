//! Hierarchical process record models.

use chrono::NaiveDate;
use qms_core::hierarchy::HierarchyNode;
use qms_core::process_record::{
    Attachment, ChecklistItem, Priority, RecordComment, RecordState, StateHistoryEntry,
};
use qms_core::types::{DbId, Percent, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A row from the `process_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProcessRecord {
    pub id: DbId,
    pub tenant_id: DbId,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub process_definition_id: Option<DbId>,
    #[sqlx(try_from = "String")]
    pub state: RecordState,
    pub state_history: Json<Vec<StateHistoryEntry>>,
    pub parent_id: Option<DbId>,
    pub level: i16,
    pub responsible_id: Option<DbId>,
    pub assigned_to: Vec<DbId>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<Timestamp>,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub progress: Percent,
    pub attachments: Json<Vec<Attachment>>,
    pub checklist: Json<Vec<ChecklistItem>>,
    pub comments: Json<Vec<RecordComment>>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub is_archived: bool,
    pub created_by: DbId,
    pub updated_by: Option<DbId>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl HierarchyNode for ProcessRecord {
    fn node_id(&self) -> DbId {
        self.id
    }

    fn parent_id(&self) -> Option<DbId> {
        self.parent_id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

/// DTO for creating a hierarchical record.
///
/// `code` is generated when absent; `level` is always computed.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateProcessRecord {
    #[validate(length(min = 1, max = 40))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    pub description: Option<String>,
    pub process_definition_id: Option<DbId>,
    pub parent_id: Option<DbId>,
    pub responsible_id: Option<DbId>,
    #[serde(default)]
    pub assigned_to: Vec<DbId>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<Priority>,
    #[validate(range(min = 0, max = 100))]
    pub progress: Option<Percent>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// DTO for updating a hierarchical record. State changes go through
/// `change_state`; parent and level are fixed at creation.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProcessRecord {
    #[validate(length(min = 1, max = 300))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub responsible_id: Option<DbId>,
    pub assigned_to: Option<Vec<DbId>>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<Priority>,
    #[validate(range(min = 0, max = 100))]
    pub progress: Option<Percent>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Request body for a state transition.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeStateRequest {
    pub state: RecordState,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCommentRequest {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddChecklistItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleChecklistItemRequest {
    pub done: bool,
}

/// File metadata to attach; the upload itself happens elsewhere.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddAttachmentRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 1))]
    pub storage_path: String,
    pub content_type: Option<String>,
    #[validate(range(min = 0))]
    pub size_bytes: i64,
}

/// Sort order for record listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrder {
    /// `created_at DESC`.
    #[default]
    Newest,
    /// `due_date ASC` (undated last), then `priority DESC`.
    DueDate,
}

/// Query parameters for listing records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordListQuery {
    pub state: Option<RecordState>,
    #[serde(default)]
    pub order: RecordOrder,
}

/// Count of visible records in one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordStateCount {
    pub state: RecordState,
    pub count: i64,
}
