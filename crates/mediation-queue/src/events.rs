use mediation_core::{MediationEvent, Provider};
use std::time::Instant;

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Enqueued {
        provider: Provider,
        user: String,
        timestamp: Instant,
        position: usize,
    },
    Full {
        provider: Provider,
        user: String,
        timestamp: Instant,
        max_depth: usize,
    },
    Drained {
        provider: Provider,
        user: String,
        timestamp: Instant,
        wait: std::time::Duration,
    },
    Expired {
        provider: Provider,
        user: String,
        timestamp: Instant,
    },
}

impl MediationEvent for QueueEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued { .. } => "queue_enqueued",
            QueueEvent::Full { .. } => "queue_full",
            QueueEvent::Drained { .. } => "queue_drained",
            QueueEvent::Expired { .. } => "queue_expired",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            QueueEvent::Enqueued { timestamp, .. } => *timestamp,
            QueueEvent::Full { timestamp, .. } => *timestamp,
            QueueEvent::Drained { timestamp, .. } => *timestamp,
            QueueEvent::Expired { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        "mediation-queue"
    }
}
