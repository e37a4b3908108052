//! Row types (`FromRow`) and request DTOs, one module per table.

pub mod process_definition;
pub mod process_record;
pub mod usage_event;
