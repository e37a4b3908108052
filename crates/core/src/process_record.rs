//! Hierarchical process records: states, priorities, levels and the
//! embedded audit documents (state history, checklist, comments,
//! attachments).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedded_record::PROGRESS_COMPLETE;
use crate::error::CoreError;
use crate::types::{DbId, Percent, Timestamp};

/// Deepest allowed level. Roots are level 0, so a tree holds at most six
/// generations.
pub const MAX_LEVEL: i16 = 5;

/// Maximum length of a comment body.
pub const MAX_COMMENT_LENGTH: usize = 5000;

crate::define_text_enum! {
    /// Workflow state of a hierarchical record.
    RecordState {
        Started = "started",
        InProgress = "in_progress",
        Review = "review",
        Approved = "approved",
        Completed = "completed",
        Cancelled = "cancelled",
    }
}

crate::define_text_enum! {
    /// Record priority. Declaration order is ascending urgency.
    Priority {
        Low = "low",
        Medium = "medium",
        High = "high",
        Critical = "critical",
    }
}

impl Default for RecordState {
    fn default() -> Self {
        Self::Started
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// One entry of a record's append-only state history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub state: RecordState,
    pub changed_at: Timestamp,
    pub changed_by: DbId,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub text: String,
    pub done: bool,
    pub done_by: Option<DbId>,
    pub done_at: Option<Timestamp>,
}

/// A comment; `parent_id` links replies to the comment they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordComment {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author_id: DbId,
    pub author_name: String,
    pub body: String,
    pub created_at: Timestamp,
}

/// Metadata of a file attached to a record. The bytes live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: DbId,
    pub uploaded_at: Timestamp,
}

/// Level of a new record given its parent's level (`None` for roots).
///
/// Rejects anything deeper than [`MAX_LEVEL`].
pub fn child_level(parent_level: Option<i16>) -> Result<i16, CoreError> {
    let level = match parent_level {
        None => 0,
        Some(parent) => parent + 1,
    };
    if level > MAX_LEVEL {
        return Err(CoreError::Validation(format!(
            "Record hierarchy is limited to {} levels below the root",
            MAX_LEVEL
        )));
    }
    Ok(level)
}

/// Outcome of a state change, applied by the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub entry: StateHistoryEntry,
    pub progress: Percent,
    pub completed_date: Option<Timestamp>,
}

/// Compute the effect of moving a record to `new_state`.
///
/// Any state may follow any other. `completed` stamps the completion date
/// and forces progress to 100; other states keep the current progress and
/// completion date.
pub fn apply_state_change(
    current_progress: Percent,
    current_completed_date: Option<Timestamp>,
    new_state: RecordState,
    actor: DbId,
    comment: Option<String>,
    now: Timestamp,
) -> StateChange {
    let (progress, completed_date) = if new_state == RecordState::Completed {
        (PROGRESS_COMPLETE, Some(now))
    } else {
        (current_progress, current_completed_date)
    };

    StateChange {
        entry: StateHistoryEntry {
            state: new_state,
            changed_at: now,
            changed_by: actor,
            comment: comment.filter(|c| !c.trim().is_empty()),
        },
        progress,
        completed_date,
    }
}

/// Check a direct progress edit against the record's state: a `completed`
/// record stays at 100.
pub fn validate_progress_for_state(state: RecordState, progress: Percent) -> Result<(), CoreError> {
    if state == RecordState::Completed && progress != PROGRESS_COMPLETE {
        return Err(CoreError::Validation(format!(
            "A completed record must stay at {PROGRESS_COMPLETE}% progress; change its state first"
        )));
    }
    Ok(())
}

/// The first history entry of a freshly created record.
pub fn initial_history(actor: DbId, now: Timestamp) -> Vec<StateHistoryEntry> {
    vec![StateHistoryEntry {
        state: RecordState::Started,
        changed_at: now,
        changed_by: actor,
        comment: None,
    }]
}

/// Validate a comment body and, for replies, that the parent exists.
pub fn validate_comment(
    body: &str,
    parent_id: Option<Uuid>,
    existing: &[RecordComment],
) -> Result<(), CoreError> {
    if body.trim().is_empty() {
        return Err(CoreError::Validation("Comment must not be empty".into()));
    }
    if body.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Comment must be at most {MAX_COMMENT_LENGTH} characters"
        )));
    }
    if let Some(parent) = parent_id {
        if !existing.iter().any(|c| c.id == parent) {
            return Err(CoreError::not_found("RecordComment", parent));
        }
    }
    Ok(())
}

/// Flip a checklist item, stamping who completed it.
pub fn toggle_checklist_item(
    items: &mut [ChecklistItem],
    item_id: Uuid,
    done: bool,
    actor: DbId,
    now: Timestamp,
) -> Result<ChecklistItem, CoreError> {
    let item = items
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or_else(|| CoreError::not_found("ChecklistItem", item_id))?;
    item.done = done;
    if done {
        item.done_by = Some(actor);
        item.done_at = Some(now);
    } else {
        item.done_by = None;
        item.done_at = None;
    }
    Ok(item.clone())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    #[test]
    fn root_level_is_zero() {
        assert_eq!(child_level(None).unwrap(), 0);
    }

    #[test]
    fn child_level_is_parent_plus_one() {
        assert_eq!(child_level(Some(0)).unwrap(), 1);
        assert_eq!(child_level(Some(4)).unwrap(), 5);
    }

    #[test]
    fn level_beyond_cap_rejected() {
        assert_matches!(child_level(Some(MAX_LEVEL)), Err(CoreError::Validation(_)));
    }

    #[test]
    fn completed_record_progress_is_pinned() {
        assert_matches!(
            validate_progress_for_state(RecordState::Completed, 10),
            Err(CoreError::Validation(_))
        );
        assert!(validate_progress_for_state(RecordState::Completed, 100).is_ok());
        assert!(validate_progress_for_state(RecordState::Review, 10).is_ok());
    }

    #[test]
    fn completing_forces_progress_and_date() {
        let now = Utc::now();
        let change = apply_state_change(20, None, RecordState::Completed, 7, None, now);
        assert_eq!(change.progress, 100);
        assert_eq!(change.completed_date, Some(now));
        assert_eq!(change.entry.state, RecordState::Completed);
        assert_eq!(change.entry.changed_by, 7);
    }

    #[test]
    fn other_states_keep_progress() {
        let change =
            apply_state_change(40, None, RecordState::Review, 1, Some("ready".into()), Utc::now());
        assert_eq!(change.progress, 40);
        assert!(change.completed_date.is_none());
        assert_eq!(change.entry.comment.as_deref(), Some("ready"));
    }

    #[test]
    fn blank_comment_is_dropped() {
        let change = apply_state_change(0, None, RecordState::Review, 1, Some("  ".into()), Utc::now());
        assert!(change.entry.comment.is_none());
    }

    #[test]
    fn reopening_keeps_previous_completion_date() {
        let done_at = Utc::now();
        let change =
            apply_state_change(100, Some(done_at), RecordState::InProgress, 1, None, Utc::now());
        assert_eq!(change.completed_date, Some(done_at));
    }

    #[test]
    fn initial_history_starts_in_started() {
        let history = initial_history(3, Utc::now());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, RecordState::Started);
    }

    #[test]
    fn reply_to_missing_comment_rejected() {
        let result = validate_comment("hi", Some(Uuid::new_v4()), &[]);
        assert_matches!(result, Err(CoreError::NotFound { .. }));
    }

    #[test]
    fn empty_comment_rejected() {
        assert!(validate_comment(" ", None, &[]).is_err());
    }

    #[test]
    fn toggle_marks_and_unmarks() {
        let id = Uuid::new_v4();
        let mut items = vec![ChecklistItem {
            id,
            text: "Calibrate gauge".into(),
            done: false,
            done_by: None,
            done_at: None,
        }];
        let item = toggle_checklist_item(&mut items, id, true, 9, Utc::now()).unwrap();
        assert!(item.done);
        assert_eq!(item.done_by, Some(9));

        let item = toggle_checklist_item(&mut items, id, false, 9, Utc::now()).unwrap();
        assert!(!item.done);
        assert!(item.done_at.is_none());
    }

    #[test]
    fn priority_order_is_ascending_urgency() {
        assert_eq!(Priority::ALL.first(), Some(&Priority::Low));
        assert_eq!(Priority::ALL.last(), Some(&Priority::Critical));
    }
}
