//! [`MediationStack`]: wires C2-C10 into one running instance from a store
//! and a config document, the way `tower_resilience`'s `combined`/`full_stack`
//! examples assemble several pattern layers around one inner service — here
//! the "layers" are components composed inside [`mediation_coordinator::RateLimitCoordinator`]
//! plus the two background loops (queue drain, alert evaluation) that run
//! alongside it.

use std::sync::Arc;
use std::time::Duration;

use mediation_config::MediationConfig;
use mediation_core::{EventListeners, KvStore, UpstreamAdapter};
use mediation_coordinator::RateLimitCoordinator;
use mediation_metrics::{AlertEvaluator, MetricsCollector};
use mediation_prefetch::PrefetchOrchestrator;
use mediation_queue::{QueueScheduler, RequestQueue};

/// The fully assembled mediation layer: an admission authority plus its two
/// background loops (queue drain, alert evaluation). Cloning is cheap — every
/// field is an `Arc` or a `Clone`-cheap handle.
pub struct MediationStack<S: KvStore> {
    pub coordinator: Arc<RateLimitCoordinator<S>>,
    pub prefetch: Arc<PrefetchOrchestrator<S>>,
    pub metrics: MetricsCollector,
    pub alerts: Arc<AlertEvaluator<S>>,
    queue_scheduler: Arc<QueueScheduler<S>>,
}

impl<S: KvStore> MediationStack<S> {
    /// Assembles the stack. `adapter` is the embedder's single
    /// `UpstreamAdapter` (spec §6), routed by `Provider` on every call.
    pub fn build(store: Arc<S>, config: Arc<MediationConfig>, adapter: Arc<dyn UpstreamAdapter>) -> Arc<Self> {
        let metrics = MetricsCollector::new();

        let mut queue_listeners = EventListeners::new();
        queue_listeners.add(metrics.clone());
        let queue = Arc::new(RequestQueue::new(Arc::clone(&store)).with_event_listeners(queue_listeners));

        let mut coordinator_listeners = EventListeners::new();
        coordinator_listeners.add(metrics.clone());
        let coordinator = Arc::new(
            RateLimitCoordinator::new(Arc::clone(&store), Arc::clone(&config))
                .with_queue(Arc::clone(&queue))
                .with_event_listeners(coordinator_listeners),
        );

        let queue_scheduler = Arc::new(QueueScheduler::new(
            Arc::clone(&queue),
            coordinator.clone() as Arc<dyn mediation_queue::DrainHandler>,
            Duration::from_millis(200),
        ));

        let mut prefetch_listeners = EventListeners::new();
        prefetch_listeners.add(metrics.clone());
        let prefetch = Arc::new(
            PrefetchOrchestrator::new(Arc::clone(&store), Arc::clone(&coordinator), adapter, config.prefetch.clone())
                .with_event_listeners(prefetch_listeners),
        );

        let alerts = Arc::new(AlertEvaluator::new(Arc::clone(&store), metrics.clone(), config.alerts.clone()));

        Arc::new(Self {
            coordinator,
            prefetch,
            metrics,
            alerts,
            queue_scheduler,
        })
    }

    /// Starts every background loop: queue draining, prefetch sweeps, and
    /// alert evaluation. Call once per process; `stop` tears all three down.
    pub async fn start(self: &Arc<Self>) {
        self.queue_scheduler.start().await;
        self.prefetch.start().await;
        self.alerts.start(Duration::from_secs(self.alerts_eval_interval_secs()));
    }

    pub async fn stop(&self) {
        self.queue_scheduler.stop().await;
        self.prefetch.stop().await;
        self.alerts.stop();
    }

    fn alerts_eval_interval_secs(&self) -> u64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mediation_core::{InMemoryStore, Operation, Priority, Provider, Tier, UpstreamDispatchError, UpstreamResponse, UpstreamStatus, UserId};
    use mediation_coordinator::AdmitRequest;

    struct StubAdapter;

    #[async_trait]
    impl UpstreamAdapter for StubAdapter {
        async fn dispatch(&self, _provider: Provider, _operation: &Operation, _params: &str) -> Result<UpstreamResponse, UpstreamDispatchError> {
            Ok(UpstreamResponse { payload: b"ok".to_vec(), status: UpstreamStatus::Success, upstream_latency_ms: 1 })
        }
    }

    const CONFIG_TOML: &str = r#"
        [tiers.free]
        video = 100

        [operation_costs.video]
        search = 1

        [cache_ttl.video.search]
        positive_seconds = 300
        negative_seconds = 10

        [rate_limits.video]
        requests_per_window = 10
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

    #[tokio::test]
    async fn build_start_stop_and_admit_round_trip() {
        let store = InMemoryStore::new();
        let config = Arc::new(MediationConfig::from_toml_str(CONFIG_TOML, None).unwrap());
        let stack = MediationStack::build(store, config, Arc::new(StubAdapter));

        stack.start().await;

        let decision = stack
            .coordinator
            .admit(AdmitRequest {
                provider: Provider::Video,
                operation: "search".to_string(),
                user: UserId::from("u1"),
                tier: Tier::Free,
                normalized_params: String::new(),
                priority: Priority::default(),
                allow_queue: true,
                deadline: Duration::from_secs(5),
            })
            .await
            .unwrap();

        assert!(matches!(decision, mediation_coordinator::Decision::CallUpstream(_)));
        assert_eq!(stack.metrics.snapshot().cache_hit_rate.get(&Provider::Video), Some(&0.0));

        stack.stop().await;
    }
}
