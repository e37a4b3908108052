//! Domain logic for the quality-management backend.
//!
//! This crate has no I/O: it validates and transforms process definitions,
//! records and quota counts, and defines the seams ([`clock::Clock`],
//! [`quota::UsageLedger`]) that the db and api crates plug into.

#[macro_use]
mod text_enum;

pub mod clock;
pub mod codes;
pub mod embedded_record;
pub mod error;
pub mod hierarchy;
pub mod process;
pub mod process_record;
pub mod quota;
pub mod roles;
pub mod stage_graph;
pub mod types;
