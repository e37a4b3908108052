//! Stage graph of a process definition.
//!
//! A process definition carries an ordered list of [`Stage`]s. At most one
//! stage is flagged initial, any number may be flagged terminal. Embedded
//! records always point at a stage by its identifier; display names are
//! for humans only and are never used to resolve a transition target.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Color assigned to stages created without one.
pub const DEFAULT_STAGE_COLOR: &str = "#6b7280";

/// Upper bound on the number of stages in a single definition.
pub const MAX_STAGES: usize = 50;

/// One node of a process definition's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    pub order: i32,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_terminal: bool,
}

fn default_color() -> String {
    DEFAULT_STAGE_COLOR.to_string()
}

/// Validate a full stage list before it is stored on a definition.
///
/// Rules:
/// - at most [`MAX_STAGES`] stages
/// - identifiers and names are non-blank; identifiers are unique
/// - ordering indexes are unique
/// - at most one stage is flagged initial
/// - colors are `#RRGGBB`
///
/// An empty list is valid; such a definition simply cannot hold records.
pub fn validate_stages(stages: &[Stage]) -> Result<(), CoreError> {
    if stages.len() > MAX_STAGES {
        return Err(CoreError::Validation(format!(
            "A process may define at most {MAX_STAGES} stages"
        )));
    }

    let mut ids = HashSet::new();
    let mut orders = HashSet::new();
    let mut initial_count = 0;

    for stage in stages {
        if stage.id.trim().is_empty() {
            return Err(CoreError::Validation("Stage id must not be empty".into()));
        }
        if stage.name.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Stage '{}' must have a name",
                stage.id
            )));
        }
        if !ids.insert(stage.id.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate stage id '{}'",
                stage.id
            )));
        }
        if !orders.insert(stage.order) {
            return Err(CoreError::Validation(format!(
                "Duplicate stage order {} (stage '{}')",
                stage.order, stage.id
            )));
        }
        validate_stage_color(&stage.color)?;
        if stage.is_initial {
            initial_count += 1;
        }
    }

    if initial_count > 1 {
        return Err(CoreError::Validation(
            "Only one stage may be flagged as initial".into(),
        ));
    }

    Ok(())
}

/// Validate that a stage color is in `#RRGGBB` hex format.
pub fn validate_stage_color(color: &str) -> Result<(), CoreError> {
    if color.len() != 7 || !color.starts_with('#') {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must be in #RRGGBB hex format"
        )));
    }
    if !color[1..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::Validation(format!(
            "Invalid color '{color}'. Must contain only hex digits after '#'"
        )));
    }
    Ok(())
}

/// The stage a new record starts in: the one flagged initial, otherwise the
/// stage with the lowest ordering index. `None` when there are no stages.
pub fn initial_stage(stages: &[Stage]) -> Option<&Stage> {
    stages
        .iter()
        .find(|s| s.is_initial)
        .or_else(|| stages.iter().min_by_key(|s| s.order))
}

/// Resolve a transition target by stage identifier.
///
/// A target that matches only a stage's display name is rejected with a
/// message pointing at the identifier to use instead, so callers migrate
/// off name-based references.
pub fn resolve_stage<'a>(stages: &'a [Stage], target: &str) -> Result<&'a Stage, CoreError> {
    if let Some(stage) = stages.iter().find(|s| s.id == target) {
        return Ok(stage);
    }

    if let Some(stage) = stages.iter().find(|s| s.name == target) {
        return Err(CoreError::Validation(format!(
            "Stages must be referenced by id: use '{}' instead of the name '{target}'",
            stage.id
        )));
    }

    Err(CoreError::Validation(format!(
        "Invalid state: no stage '{target}' in this process"
    )))
}

/// Stages sorted by their ordering index.
pub fn ordered(stages: &[Stage]) -> Vec<&Stage> {
    let mut sorted: Vec<&Stage> = stages.iter().collect();
    sorted.sort_by_key(|s| s.order);
    sorted
}

#[cfg(test)]
pub(crate) fn stage(id: &str, order: i32, is_initial: bool, is_terminal: bool) -> Stage {
    Stage {
        id: id.to_string(),
        name: format!("Stage {id}"),
        color: DEFAULT_STAGE_COLOR.to_string(),
        order,
        is_initial,
        is_terminal,
    }
}
