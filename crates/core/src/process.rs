//! Process definition enums and field validation.

use crate::error::CoreError;

/// Maximum length of a process definition code.
pub const MAX_CODE_LENGTH: usize = 32;

/// Maximum length of a process definition name.
pub const MAX_NAME_LENGTH: usize = 200;

crate::define_text_enum! {
    /// ISO-9001 process map category.
    ProcessCategory {
        Strategic = "strategic",
        Operational = "operational",
        Support = "support",
    }
}

crate::define_text_enum! {
    /// Lifecycle status of a process definition.
    ProcessStatus {
        Active = "active",
        Inactive = "inactive",
        InReview = "in_review",
    }
}

/// Validate a tenant-scoped process code.
///
/// Codes are short identifiers like `P-OPS-01`: ASCII letters, digits,
/// `-` and `_`, at most [`MAX_CODE_LENGTH`] characters. Codes are compared
/// case-sensitively.
pub fn validate_process_code(code: &str) -> Result<(), CoreError> {
    if code.trim().is_empty() {
        return Err(CoreError::Validation("Process code must not be empty".into()));
    }
    if code.len() > MAX_CODE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Process code must be at most {MAX_CODE_LENGTH} characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Process code '{code}' may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

/// Validate a process definition name.
pub fn validate_process_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("Process name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Process name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}
