use mediation_core::{MediationEvent, Provider};
use std::time::Instant;

#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Admitted {
        provider: Provider,
        user: String,
        timestamp: Instant,
        decision: &'static str,
    },
    Rejected {
        provider: Provider,
        user: String,
        timestamp: Instant,
        reason: &'static str,
    },
    Completed {
        provider: Provider,
        user: String,
        timestamp: Instant,
        outcome: &'static str,
    },
}

impl MediationEvent for CoordinatorEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CoordinatorEvent::Admitted { .. } => "coordinator_admitted",
            CoordinatorEvent::Rejected { .. } => "coordinator_rejected",
            CoordinatorEvent::Completed { .. } => "coordinator_completed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CoordinatorEvent::Admitted { timestamp, .. } => *timestamp,
            CoordinatorEvent::Rejected { timestamp, .. } => *timestamp,
            CoordinatorEvent::Completed { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        "mediation-coordinator"
    }
}
