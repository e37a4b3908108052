//! Record lifecycle orchestration.
//!
//! Handlers stay thin: each operation here loads state through the
//! repositories, applies the pure rules from `qms_core`, persists with
//! optimistic concurrency and publishes the resulting platform event.

pub mod process_definitions;
pub mod process_records;
