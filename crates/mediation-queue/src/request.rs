//! The `QueuedRequest` persisted record (spec §3) and the hand-off contract
//! the draining scheduler uses to ask an admission authority whether a head
//! item can proceed, grounded on `tower_resilience_healthcheck::HealthChecker`'s
//! trait-implemented-by-the-caller shape: the queue defines the trait, the
//! coordinator (which depends on the queue, not the reverse) implements it.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mediation_core::{Operation, Priority, Provider, UserId};
use serde::{Deserialize, Serialize};

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_millis() as i64
}

/// `(user, provider, operation, params, priority, enqueued_at, deadline)`
/// (spec §3). Ordered by `(priority desc, enqueued_at asc)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub user: String,
    pub provider: Provider,
    pub operation: String,
    pub normalized_params: String,
    pub priority: Priority,
    pub enqueued_at_ms: i64,
    pub deadline_ms: i64,
    /// Monotonic per-enqueue sequence, breaks ties when `enqueued_at_ms` is
    /// identical (same-millisecond bursts) so ordering stays deterministic.
    pub sequence: u64,
}

impl QueuedRequest {
    pub fn new(user: UserId, provider: Provider, operation: Operation, normalized_params: String, priority: Priority, deadline: std::time::Duration, sequence: u64) -> Self {
        let now = now_ms();
        Self {
            user: user.0,
            provider,
            operation: operation.0,
            normalized_params,
            priority,
            enqueued_at_ms: now,
            deadline_ms: now + deadline.as_millis() as i64,
            sequence,
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId(self.user.clone())
    }

    pub fn operation(&self) -> Operation {
        Operation(self.operation.clone())
    }

    pub fn is_expired(&self) -> bool {
        now_ms() >= self.deadline_ms
    }

    pub fn age(&self) -> std::time::Duration {
        std::time::Duration::from_millis((now_ms() - self.enqueued_at_ms).max(0) as u64)
    }

    /// Ordering key: `(priority desc, enqueued_at asc, sequence asc)`.
    fn ordering_key(&self) -> (std::cmp::Reverse<Priority>, i64, u64) {
        (std::cmp::Reverse(self.priority), self.enqueued_at_ms, self.sequence)
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

/// Outcome of one scheduler attempt to drain a head-of-queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The coordinator admitted the request; it has been dispatched and
    /// removed from the queue.
    Dispatched,
    /// Still denied (rate or quota); left in place for the next sweep.
    StillDenied,
}

/// Implemented by the admission authority (`mediation-coordinator`) and
/// injected into the scheduler, breaking the cyclic `queue <-> coordinator`
/// dependency the teacher's circuit-breaker/health-check pair avoids the
/// same way (spec §9 REDESIGN FLAGS, "cyclic references").
#[async_trait]
pub trait DrainHandler: Send + Sync {
    async fn try_admit(&self, request: &QueuedRequest) -> DrainOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(priority: Priority, enqueued_at_ms: i64, sequence: u64) -> QueuedRequest {
        QueuedRequest {
            user: "u1".into(),
            provider: Provider::Video,
            operation: "search".into(),
            normalized_params: String::new(),
            priority,
            enqueued_at_ms,
            deadline_ms: enqueued_at_ms + 60_000,
            sequence,
        }
    }

    #[test]
    fn higher_priority_sorts_first() {
        let low = req(0, 100, 0);
        let high = req(5, 200, 1);
        assert!(high < low);
    }

    #[test]
    fn same_priority_orders_by_enqueued_at() {
        let earlier = req(5, 100, 0);
        let later = req(5, 200, 1);
        assert!(earlier < later);
    }

    #[test]
    fn same_priority_and_timestamp_breaks_tie_by_sequence() {
        let first = req(5, 100, 0);
        let second = req(5, 100, 1);
        assert!(first < second);
    }

    #[test]
    fn expiry_uses_wall_clock_deadline() {
        let mut r = req(0, now_ms(), 0);
        r.deadline_ms = now_ms() - 1;
        assert!(r.is_expired());
    }
}
