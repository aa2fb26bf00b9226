use mediation_core::{MediationEvent, Provider};
use std::time::{Duration, Instant};

/// Events emitted by the sliding-window counter, consumed by
/// `mediation-metrics` via the shared event bus rather than by direct calls.
#[derive(Debug, Clone)]
pub enum RateLimitEvent {
    Admitted {
        provider: Provider,
        user: String,
        timestamp: Instant,
        wait_duration: Duration,
    },
    Denied {
        provider: Provider,
        user: String,
        timestamp: Instant,
        retry_after: Duration,
    },
}

impl MediationEvent for RateLimitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimitEvent::Admitted { .. } => "rate_limit_admitted",
            RateLimitEvent::Denied { .. } => "rate_limit_denied",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimitEvent::Admitted { timestamp, .. } => *timestamp,
            RateLimitEvent::Denied { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        "mediation-ratelimit"
    }
}
