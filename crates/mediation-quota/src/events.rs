use mediation_core::{MediationEvent, Provider};
use std::time::Instant;

#[derive(Debug, Clone)]
pub enum QuotaEvent {
    Charged {
        provider: Provider,
        user: String,
        timestamp: Instant,
        cost: u32,
        current: u32,
        cap: u32,
    },
    Denied {
        provider: Provider,
        user: String,
        timestamp: Instant,
        current: u32,
        cap: u32,
    },
    Compensated {
        provider: Provider,
        user: String,
        timestamp: Instant,
        cost: u32,
    },
}

impl MediationEvent for QuotaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuotaEvent::Charged { .. } => "quota_charged",
            QuotaEvent::Denied { .. } => "quota_denied",
            QuotaEvent::Compensated { .. } => "quota_compensated",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            QuotaEvent::Charged { timestamp, .. } => *timestamp,
            QuotaEvent::Denied { timestamp, .. } => *timestamp,
            QuotaEvent::Compensated { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        "mediation-quota"
    }
}
