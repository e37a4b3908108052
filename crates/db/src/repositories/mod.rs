//! Repository layer: one zero-sized struct per table, async functions taking
//! a pool or a transaction.

pub mod process_definition_repo;
pub mod process_record_repo;
pub mod record_code_sequence_repo;
pub mod usage_event_repo;

pub use process_definition_repo::ProcessDefinitionRepo;
pub use process_record_repo::{NewRecordRow, ProcessRecordRepo};
pub use record_code_sequence_repo::RecordCodeSequenceRepo;
pub use usage_event_repo::UsageEventRepo;
