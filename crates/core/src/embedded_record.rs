//! Lifecycle of records embedded in a process definition document.
//!
//! Embedded records have no identity outside their definition: every
//! operation here mutates the definition's record list in memory and the
//! caller persists the whole definition afterwards. All validation runs
//! before the first mutation so a rejected operation leaves the list as it
//! was.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::stage_graph::{self, Stage};
use crate::types::{Percent, Timestamp};

/// Progress value forced on records that reach a terminal stage.
pub const PROGRESS_COMPLETE: Percent = 100;

/// A unit of work moving through a definition's stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub stage_id: String,
    pub owner: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub progress: Percent,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Input for [`create_record`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEmbeddedRecord {
    pub title: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Partial update for [`update_record`]. Stage changes go through
/// [`move_record`] only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedRecordChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub progress: Option<Percent>,
    pub notes: Option<String>,
}

/// Validate that a progress value is within `0..=100`.
pub fn validate_progress(progress: Percent) -> Result<(), CoreError> {
    if !(0..=PROGRESS_COMPLETE).contains(&progress) {
        return Err(CoreError::Validation(format!(
            "progress must be between 0 and 100, got {progress}"
        )));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation("Record title must not be empty".into()));
    }
    Ok(())
}

fn validate_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), CoreError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(CoreError::Validation(format!(
                "end_date {end} is before start_date {start}"
            )));
        }
    }
    Ok(())
}

/// Create a record in the definition's initial stage and append it.
///
/// Fails when the definition does not allow record creation or has no
/// stages.
pub fn create_record(
    stages: &[Stage],
    records: &mut Vec<EmbeddedRecord>,
    allows_records: bool,
    input: NewEmbeddedRecord,
    now: Timestamp,
) -> Result<EmbeddedRecord, CoreError> {
    if !allows_records {
        return Err(CoreError::Validation(
            "This process does not allow record creation".into(),
        ));
    }
    let stage = stage_graph::initial_stage(stages).ok_or_else(|| {
        CoreError::Validation("Cannot create a record: the process has no stages".into())
    })?;
    validate_title(&input.title)?;
    validate_date_range(input.start_date, input.end_date)?;

    let record = EmbeddedRecord {
        id: Uuid::new_v4(),
        title: input.title,
        description: input.description,
        stage_id: stage.id.clone(),
        owner: input.owner,
        start_date: input.start_date,
        end_date: input.end_date,
        progress: 0,
        notes: input.notes,
        created_at: now,
        updated_at: now,
    };
    records.push(record.clone());
    Ok(record)
}

/// Move a record to the stage identified by `target_stage_id`.
///
/// A terminal target forces progress to [`PROGRESS_COMPLETE`].
pub fn move_record(
    stages: &[Stage],
    records: &mut [EmbeddedRecord],
    record_id: Uuid,
    target_stage_id: &str,
    now: Timestamp,
) -> Result<EmbeddedRecord, CoreError> {
    let record = records
        .iter_mut()
        .find(|r| r.id == record_id)
        .ok_or_else(|| CoreError::not_found("EmbeddedRecord", record_id))?;
    let stage = stage_graph::resolve_stage(stages, target_stage_id)?;

    record.stage_id = stage.id.clone();
    record.updated_at = now;
    if stage.is_terminal {
        record.progress = PROGRESS_COMPLETE;
    }
    Ok(record.clone())
}

/// Apply a partial update to a record.
///
/// A record in a terminal stage keeps [`PROGRESS_COMPLETE`]; lowering it
/// requires moving the record out of that stage first.
pub fn update_record(
    stages: &[Stage],
    records: &mut [EmbeddedRecord],
    record_id: Uuid,
    changes: EmbeddedRecordChanges,
    now: Timestamp,
) -> Result<EmbeddedRecord, CoreError> {
    let record = records
        .iter_mut()
        .find(|r| r.id == record_id)
        .ok_or_else(|| CoreError::not_found("EmbeddedRecord", record_id))?;

    if let Some(title) = &changes.title {
        validate_title(title)?;
    }
    if let Some(progress) = changes.progress {
        validate_progress(progress)?;
        let in_terminal_stage = stages
            .iter()
            .any(|s| s.id == record.stage_id && s.is_terminal);
        if in_terminal_stage && progress != PROGRESS_COMPLETE {
            return Err(CoreError::Validation(format!(
                "Records in the terminal stage '{}' must stay at {PROGRESS_COMPLETE}% progress",
                record.stage_id
            )));
        }
    }
    validate_date_range(
        changes.start_date.or(record.start_date),
        changes.end_date.or(record.end_date),
    )?;

    if let Some(title) = changes.title {
        record.title = title;
    }
    if changes.description.is_some() {
        record.description = changes.description;
    }
    if changes.owner.is_some() {
        record.owner = changes.owner;
    }
    if changes.start_date.is_some() {
        record.start_date = changes.start_date;
    }
    if changes.end_date.is_some() {
        record.end_date = changes.end_date;
    }
    if let Some(progress) = changes.progress {
        record.progress = progress;
    }
    if changes.notes.is_some() {
        record.notes = changes.notes;
    }
    record.updated_at = now;
    Ok(record.clone())
}

/// Remove a record. Returns `false` (and changes nothing) when absent.
pub fn remove_record(records: &mut Vec<EmbeddedRecord>, record_id: Uuid) -> bool {
    let before = records.len();
    records.retain(|r| r.id != record_id);
    records.len() != before
}

/// Records whose current stage is not part of `stages`.
///
/// Used when a definition's stage list is replaced: stages still holding
/// records cannot be dropped.
pub fn records_without_stage<'a>(
    stages: &[Stage],
    records: &'a [EmbeddedRecord],
) -> Vec<&'a EmbeddedRecord> {
    records
        .iter()
        .filter(|r| !stages.iter().any(|s| s.id == r.stage_id))
        .collect()
}
