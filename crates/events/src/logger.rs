//! Background subscriber that writes platform events to the tracing sink.
//!
//! Quota warnings are logged at `warn` so they reach administrators'
//! alerting; everything else is `info`.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::{event_types, PlatformEvent};

pub struct EventLogger;

impl EventLogger {
    /// Run until `cancel` fires or the bus is dropped.
    pub async fn run(mut receiver: broadcast::Receiver<PlatformEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event logger stopping");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => Self::log(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, event logger shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn log(event: &PlatformEvent) {
        if event.event_type == event_types::QUOTA_WARNING_THRESHOLD_REACHED {
            tracing::warn!(
                tenant_id = event.tenant_id,
                payload = %event.payload,
                "Organization reached the usage warning threshold"
            );
        } else {
            tracing::info!(
                event_type = %event.event_type,
                tenant_id = event.tenant_id,
                entity_type = ?event.source_entity_type,
                entity_id = ?event.source_entity_id,
                actor = ?event.actor_user_id,
                "Platform event"
            );
        }
    }
}
