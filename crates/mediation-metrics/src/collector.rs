//! [`MetricsCollector`]: the event-bus listener that feeds both the
//! `metrics` crate (spec §4.9's `requests_total`, `cache_events_total`,
//! `queue_depth`, `quota_used`, `upstream_latency_ms`,
//! `upstream_errors_total`) and the in-process [`crate::aggregate::Aggregates`]
//! the [`crate::AlertEvaluator`] reads.

use std::sync::Arc;

use mediation_cache::CacheEvent;
use mediation_coordinator::CoordinatorEvent;
use mediation_core::EventListener;
use mediation_prefetch::PrefetchEvent;
use mediation_quota::QuotaEvent;
use mediation_queue::QueueEvent;
use mediation_ratelimit::RateLimitEvent;

use crate::aggregate::{Aggregates, MetricsSnapshot};

/// Registered on each component's `EventListeners<_>` (e.g.
/// `RateLimitCoordinator::with_event_listeners`,
/// `ResponseCache::with_event_listeners`), one clone per event type.
/// Cheap to clone — internally an `Arc<Aggregates>`.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    aggregates: Arc<Aggregates>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.aggregates.snapshot()
    }
}

impl EventListener<CoordinatorEvent> for MetricsCollector {
    fn on_event(&self, event: &CoordinatorEvent) {
        match event {
            CoordinatorEvent::Admitted { provider, decision, .. } => {
                self.aggregates.record_request(*provider, false);
                let is_cache_hit = matches!(*decision, "cache_hit" | "single_flight_wait_hit");
                if matches!(*decision, "cache_hit" | "single_flight_wait_hit" | "dispatch" | "dispatch_raced") {
                    self.aggregates.record_cache(*provider, is_cache_hit);
                }
                metrics::counter!("requests_total", "provider" => provider.as_str(), "outcome" => *decision).increment(1);
            }
            CoordinatorEvent::Rejected { provider, reason, .. } => {
                self.aggregates.record_request(*provider, true);
                metrics::counter!("requests_total", "provider" => provider.as_str(), "outcome" => *reason).increment(1);
            }
            CoordinatorEvent::Completed { provider, outcome, .. } => {
                let is_error = matches!(*outcome, "provider_error" | "provider_throttled");
                self.aggregates.record_upstream(*provider, is_error);
                if is_error {
                    metrics::counter!("upstream_errors_total", "provider" => provider.as_str(), "kind" => *outcome).increment(1);
                }
            }
        }
    }
}

impl EventListener<CacheEvent> for MetricsCollector {
    fn on_event(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Hit { is_negative, .. } => {
                // Cache hit-rate is tracked per provider, but `CacheEvent`
                // (deliberately, see mediation-cache's DESIGN.md entry) does
                // not carry the provider — it is keyed by scope-qualified
                // fingerprint only. The evaluator reads the coordinator's
                // per-provider rollup instead; this event still drives the
                // global `cache_events_total` counter spec §4.9 names.
                let kind = if *is_negative { "negative" } else { "hit" };
                metrics::counter!("cache_events_total", "kind" => kind).increment(1);
            }
            CacheEvent::Miss { .. } => {
                metrics::counter!("cache_events_total", "kind" => "miss").increment(1);
            }
            CacheEvent::SingleFlightLeader { .. }
            | CacheEvent::SingleFlightWaiter { .. }
            | CacheEvent::SingleFlightRaced { .. } => {
                metrics::counter!("cache_events_total", "kind" => event.event_type_suffix()).increment(1);
            }
        }
    }
}

impl EventListener<QueueEvent> for MetricsCollector {
    fn on_event(&self, event: &QueueEvent) {
        match event {
            QueueEvent::Enqueued { user, position, .. } => {
                self.aggregates.set_queue_depth(user, *position);
                metrics::gauge!("queue_depth", "user" => user.clone()).set(*position as f64);
            }
            QueueEvent::Drained { user, .. } => {
                self.aggregates.set_queue_depth(user, 0);
                metrics::gauge!("queue_depth", "user" => user.clone()).set(0.0);
            }
            QueueEvent::Expired { user, .. } => {
                metrics::counter!("requests_total", "outcome" => "queue_timeout", "provider" => "unknown").increment(1);
                let _ = user;
            }
            QueueEvent::Full { user, max_depth, .. } => {
                metrics::counter!("requests_total", "outcome" => "queue_full", "provider" => "unknown").increment(1);
                let _ = (user, max_depth);
            }
        }
    }
}

impl EventListener<QuotaEvent> for MetricsCollector {
    fn on_event(&self, event: &QuotaEvent) {
        match event {
            QuotaEvent::Charged { provider, user, current, cap, .. } => {
                self.aggregates.set_quota_usage(*provider, user, *current, *cap);
                metrics::gauge!("quota_used", "provider" => provider.as_str(), "user" => user.clone()).set(*current as f64);
            }
            QuotaEvent::Denied { provider, user, current, cap } => {
                self.aggregates.set_quota_usage(*provider, user, *current, *cap);
            }
            QuotaEvent::Compensated { provider, user, cost } => {
                metrics::counter!("quota_compensated_total", "provider" => provider.as_str()).increment(*cost as u64);
                let _ = user;
            }
        }
    }
}

impl EventListener<RateLimitEvent> for MetricsCollector {
    fn on_event(&self, event: &RateLimitEvent) {
        match event {
            RateLimitEvent::Admitted { provider, .. } => {
                metrics::counter!("rate_limit_admitted_total", "provider" => provider.as_str()).increment(1);
            }
            RateLimitEvent::Denied { provider, .. } => {
                metrics::counter!("rate_limit_denied_total", "provider" => provider.as_str()).increment(1);
            }
        }
    }
}

impl EventListener<PrefetchEvent> for MetricsCollector {
    fn on_event(&self, event: &PrefetchEvent) {
        match event {
            PrefetchEvent::Warmed { provider, .. } => {
                metrics::counter!("prefetch_warmed_total", "provider" => provider.as_str()).increment(1);
            }
            PrefetchEvent::Skipped { provider, reason, .. } => {
                metrics::counter!("prefetch_skipped_total", "provider" => provider.as_str(), "reason" => *reason).increment(1);
            }
            PrefetchEvent::LeaseContended { provider, .. } => {
                metrics::counter!("prefetch_lease_contended_total", "provider" => provider.as_str()).increment(1);
            }
        }
    }
}

/// Records an upstream dispatch's latency directly (spec §4.9's
/// `upstream_latency_ms` histogram); not event-driven because the
/// coordinator's `complete()` call carries the adapter's
/// `upstream_latency_ms` field, which has no dedicated event variant of its
/// own (see [`mediation_core::UpstreamResponse`]).
pub fn record_upstream_latency(provider: mediation_core::Provider, latency_ms: u64) {
    metrics::histogram!("upstream_latency_ms", "provider" => provider.as_str()).record(latency_ms as f64);
}

trait CacheEventTypeSuffix {
    fn event_type_suffix(&self) -> &'static str;
}

impl CacheEventTypeSuffix for CacheEvent {
    fn event_type_suffix(&self) -> &'static str {
        match self {
            CacheEvent::SingleFlightLeader { .. } => "single_flight_leader",
            CacheEvent::SingleFlightWaiter { .. } => "single_flight_waiter",
            CacheEvent::SingleFlightRaced { .. } => "single_flight_raced",
            _ => "other",
        }
    }
}
