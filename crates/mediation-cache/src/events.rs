use mediation_core::MediationEvent;
use std::time::Instant;

#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit {
        fingerprint: String,
        timestamp: Instant,
        is_negative: bool,
    },
    Miss {
        fingerprint: String,
        timestamp: Instant,
    },
    SingleFlightLeader {
        fingerprint: String,
        timestamp: Instant,
    },
    SingleFlightWaiter {
        fingerprint: String,
        timestamp: Instant,
    },
    SingleFlightRaced {
        fingerprint: String,
        timestamp: Instant,
    },
}

impl MediationEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "cache_hit",
            CacheEvent::Miss { .. } => "cache_miss",
            CacheEvent::SingleFlightLeader { .. } => "single_flight_leader",
            CacheEvent::SingleFlightWaiter { .. } => "single_flight_waiter",
            CacheEvent::SingleFlightRaced { .. } => "single_flight_raced",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. } => *timestamp,
            CacheEvent::Miss { timestamp, .. } => *timestamp,
            CacheEvent::SingleFlightLeader { timestamp, .. } => *timestamp,
            CacheEvent::SingleFlightWaiter { timestamp, .. } => *timestamp,
            CacheEvent::SingleFlightRaced { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        "mediation-cache"
    }
}
