//! Process definition models.

use qms_core::embedded_record::EmbeddedRecord;
use qms_core::process::{ProcessCategory, ProcessStatus};
use qms_core::stage_graph::Stage;
use qms_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

/// A row from the `process_definitions` table, embedded documents included.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProcessDefinition {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub code: String,
    #[sqlx(try_from = "String")]
    pub category: ProcessCategory,
    #[sqlx(try_from = "String")]
    pub status: ProcessStatus,
    pub stages: Json<Vec<Stage>>,
    pub records: Json<Vec<EmbeddedRecord>>,
    pub allows_records: bool,
    pub content: Option<String>,
    pub diagram: Option<String>,
    pub is_archived: bool,
    pub created_by: DbId,
    pub updated_by: Option<DbId>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a process definition.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProcessDefinition {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub category: Option<ProcessCategory>,
    pub status: Option<ProcessStatus>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    pub allows_records: Option<bool>,
    pub content: Option<String>,
    pub diagram: Option<String>,
}

/// DTO for updating definition metadata. Stages and records have their own
/// operations.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProcessDefinition {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<ProcessCategory>,
    pub status: Option<ProcessStatus>,
    pub allows_records: Option<bool>,
    pub content: Option<String>,
    pub diagram: Option<String>,
}

/// Request body for replacing the stage graph.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceStages {
    pub stages: Vec<Stage>,
}

/// Request body for moving an embedded record.
#[derive(Debug, Clone, Deserialize)]
pub struct MoveRecordRequest {
    pub stage_id: String,
}

/// Query filters for listing definitions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessDefinitionFilter {
    pub status: Option<ProcessStatus>,
    pub category: Option<ProcessCategory>,
}
