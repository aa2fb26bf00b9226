//! In-process running aggregates the [`crate::AlertEvaluator`] reads.
//!
//! These are *not* the system of record — the KV store is (spec §3's
//! ownership rule) — they are a per-process rollup derived from the event
//! stream, good enough for threshold comparison within one process's view.
//! A multi-process deployment runs one evaluator per process; each raises
//! and clears alerts from its own vantage point, which is acceptable for an
//! advisory signal (spec §7 error taxonomy treats nothing here as safety
//! critical).

use std::collections::HashMap;

use mediation_core::Provider;
use parking_lot::RwLock;

#[derive(Debug, Default, Clone, Copy)]
struct ProviderCounters {
    requests_total: u64,
    requests_rejected: u64,
    cache_hits: u64,
    cache_misses: u64,
    upstream_errors: u64,
    upstream_calls: u64,
}

#[derive(Default)]
pub(crate) struct Aggregates {
    by_provider: RwLock<HashMap<Provider, ProviderCounters>>,
    queue_depth: RwLock<HashMap<String, usize>>,
    quota_usage: RwLock<HashMap<(Provider, String), (u32, u32)>>,
}

/// A point-in-time view of the running aggregates, cheap to clone for a
/// threshold pass or a health/debug endpoint.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub cache_hit_rate: HashMap<Provider, f64>,
    pub api_error_rate: HashMap<Provider, f64>,
    pub queue_depth: HashMap<String, usize>,
    /// `(current_used, cap)` per `(provider, user)`, as last observed from a
    /// [`mediation_quota::QuotaEvent`] (cap varies by tier, so it travels
    /// with the event rather than being re-derived from config here).
    pub quota_usage: HashMap<(Provider, String), (u32, u32)>,
}

impl Aggregates {
    pub(crate) fn record_request(&self, provider: Provider, rejected: bool) {
        let mut map = self.by_provider.write();
        let entry = map.entry(provider).or_default();
        entry.requests_total += 1;
        if rejected {
            entry.requests_rejected += 1;
        }
    }

    pub(crate) fn record_cache(&self, provider: Provider, hit: bool) {
        let mut map = self.by_provider.write();
        let entry = map.entry(provider).or_default();
        if hit {
            entry.cache_hits += 1;
        } else {
            entry.cache_misses += 1;
        }
    }

    pub(crate) fn record_upstream(&self, provider: Provider, is_error: bool) {
        let mut map = self.by_provider.write();
        let entry = map.entry(provider).or_default();
        entry.upstream_calls += 1;
        if is_error {
            entry.upstream_errors += 1;
        }
    }

    pub(crate) fn set_queue_depth(&self, user: &str, depth: usize) {
        self.queue_depth.write().insert(user.to_string(), depth);
    }

    pub(crate) fn set_quota_usage(&self, provider: Provider, user: &str, current: u32, cap: u32) {
        self.quota_usage.write().insert((provider, user.to_string()), (current, cap));
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        let by_provider = self.by_provider.read();
        let mut cache_hit_rate = HashMap::new();
        let mut api_error_rate = HashMap::new();
        for (provider, counters) in by_provider.iter() {
            let cache_total = counters.cache_hits + counters.cache_misses;
            if cache_total > 0 {
                cache_hit_rate.insert(*provider, counters.cache_hits as f64 / cache_total as f64);
            }
            if counters.upstream_calls > 0 {
                api_error_rate.insert(*provider, counters.upstream_errors as f64 / counters.upstream_calls as f64);
            }
        }
        MetricsSnapshot {
            cache_hit_rate,
            api_error_rate,
            queue_depth: self.queue_depth.read().clone(),
            quota_usage: self.quota_usage.read().clone(),
        }
    }
}
