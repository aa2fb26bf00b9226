use mediation_core::{MediationEvent, Provider};
use std::time::Instant;

#[derive(Debug, Clone)]
pub enum PrefetchEvent {
    /// A target was warmed: the coordinator returned `CallUpstream` and the
    /// dispatch completed.
    Warmed { provider: Provider, user: String, timestamp: Instant },
    /// The coordinator returned `Queue` or `Reject` for this target — spec
    /// §4.7 step 3's "drop silently", recorded here only for observability.
    Skipped { provider: Provider, user: String, timestamp: Instant, reason: &'static str },
    /// The prefetch lease for this fingerprint was already held by another
    /// sweep (this process or another) — no duplicate work attempted.
    LeaseContended { provider: Provider, user: String, timestamp: Instant },
}

impl MediationEvent for PrefetchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PrefetchEvent::Warmed { .. } => "prefetch_warmed",
            PrefetchEvent::Skipped { .. } => "prefetch_skipped",
            PrefetchEvent::LeaseContended { .. } => "prefetch_lease_contended",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            PrefetchEvent::Warmed { timestamp, .. } => *timestamp,
            PrefetchEvent::Skipped { timestamp, .. } => *timestamp,
            PrefetchEvent::LeaseContended { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        "mediation-prefetch"
    }
}
