//! In-process event bus for workflow and quota events.
//!
//! - [`EventBus`]: publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the event envelope, tagged with the tenant.
//! - [`EventLogger`]: background subscriber writing every event to the
//!   tracing sink.

pub mod bus;
pub mod logger;

pub use bus::{event_types, EventBus, PlatformEvent};
pub use logger::EventLogger;
