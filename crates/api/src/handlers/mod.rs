pub mod assistant_usage;
pub mod process_definition;
pub mod process_record;
