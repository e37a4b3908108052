//! Human-readable record codes of the form `REG-<year>-<seq>`.
//!
//! The sequence number comes from a per-tenant, per-year counter that the
//! database increments atomically; this module only formats and checks codes.

use chrono::Datelike;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Prefix of generated hierarchical record codes.
pub const RECORD_CODE_PREFIX: &str = "REG";

/// Minimum width of the zero-padded sequence part.
pub const SEQUENCE_WIDTH: usize = 3;

/// Maximum length of a caller-supplied code.
pub const MAX_RECORD_CODE_LENGTH: usize = 40;

/// Calendar year (UTC) a code generated at `now` belongs to.
pub fn code_year(now: Timestamp) -> i32 {
    now.year()
}

/// Format a generated code, e.g. `REG-2026-007`. Sequences past 999 keep
/// growing (`REG-2026-1000`).
pub fn format_record_code(year: i32, sequence: i64) -> String {
    format!("{RECORD_CODE_PREFIX}-{year}-{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Validate a caller-supplied record code.
///
/// The `REG-` prefix is reserved for generated codes: a supplied code in that
/// namespace would take a number the tenant's counter later hands out.
pub fn validate_record_code(code: &str) -> Result<(), CoreError> {
    if code.trim().is_empty() {
        return Err(CoreError::Validation("Record code must not be empty".into()));
    }
    if code.len() > MAX_RECORD_CODE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Record code must be at most {MAX_RECORD_CODE_LENGTH} characters"
        )));
    }
    if code.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(
            "Record code must not contain whitespace".into(),
        ));
    }
    if code.starts_with(&format!("{RECORD_CODE_PREFIX}-")) {
        return Err(CoreError::Validation(format!(
            "Record codes starting with '{RECORD_CODE_PREFIX}-' are generated; omit the code to get one"
        )));
    }
    Ok(())
}
