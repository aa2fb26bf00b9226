//! Shared test harness for the mediation layer's integration tests and
//! benchmarks (`tests/`, `benches/`): a standard configuration document and
//! a couple of scriptable `UpstreamAdapter` stubs, so individual test files
//! don't each reinvent the same fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mediation::{Operation, Provider, UpstreamAdapter, UpstreamDispatchError, UpstreamResponse, UpstreamStatus};

/// A configuration document exercising every section spec §4.10 names,
/// with costs/limits small enough that tests can exhaust them in a handful
/// of calls.
pub const STANDARD_CONFIG_TOML: &str = r#"
    [tiers.free]
    video = 5
    music = 5
    chat = 5
    gaming = 5

    [tiers.premium]
    video = 1000
    music = 1000
    chat = 1000
    gaming = 1000

    [operation_costs.video]
    search = 1
    transcode = 3

    [operation_costs.music]
    recommendations = 1

    [operation_costs.chat]
    completion = 1

    [operation_costs.gaming]
    leaderboard = 1

    [cache_ttl.video.search]
    positive_seconds = 300
    negative_seconds = 10

    [cache_ttl.music.recommendations]
    positive_seconds = 600
    negative_seconds = 10

    [rate_limits.video]
    requests_per_window = 3
    window_seconds = 60

    [rate_limits.music]
    requests_per_window = 60
    window_seconds = 60

    [rate_limits.chat]
    requests_per_window = 60
    window_seconds = 60

    [rate_limits.gaming]
    requests_per_window = 60
    window_seconds = 60

    [queue]
    max_depth_per_user = 5
    default_deadline_seconds = 30

    [singleflight]
    lease_ttl_seconds = 10
    poll_slack_seconds = 0

    [prefetch]
    enabled = false
    interval_seconds = 60
    lease_ttl_seconds = 120

    [alerts]
    queue_depth_high = 100
    cache_hit_rate_low = 0.3
    api_error_rate_high = 0.1

    [store]
    connection = "memory://local"
    health_check_interval_seconds = 30
"#;

/// An adapter that always succeeds, recording a call count and an optional
/// artificial delay for contention tests (e.g. single-flight racing).
pub struct ScriptedAdapter {
    pub calls: AtomicUsize,
    pub delay: std::time::Duration,
    pub status: UpstreamStatus,
}

impl ScriptedAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: std::time::Duration::ZERO,
            status: UpstreamStatus::Success,
        })
    }

    pub fn with_delay(delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            status: UpstreamStatus::Success,
        })
    }

    pub fn throttled() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: std::time::Duration::ZERO,
            status: UpstreamStatus::Throttled,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamAdapter for ScriptedAdapter {
    async fn dispatch(&self, provider: Provider, operation: &Operation, normalized_params: &str) -> Result<UpstreamResponse, UpstreamDispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let payload = format!("{{\"provider\":\"{}\",\"operation\":\"{}\",\"params\":\"{}\"}}", provider.as_str(), operation, normalized_params).into_bytes();
        Ok(UpstreamResponse {
            payload,
            status: self.status,
            upstream_latency_ms: self.delay.as_millis() as u64,
        })
    }
}
