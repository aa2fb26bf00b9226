//! The rate-limit coordinator (spec §4.5, component C5): composes the
//! response cache (C4), sliding-window limiter (C2), quota ledger (C3), and
//! request queue (C6) into a single `admit`/`complete` decision surface, so
//! callers never have to sequence those four components themselves.
//!
//! The single-flight half of this is deliberately *not* routed through
//! `mediation_cache::SingleFlight::get_or_build` — that API bundles
//! lookup+lease+build+store behind one closure, but here the upstream
//! dispatch happens in caller code outside this crate's control (the caller
//! gets a [`crate::UpstreamLease`] back from `admit` and reports the outcome
//! later via `complete`). So this type drives `KvStore::acquire_lease` /
//! `release_lease` directly, mirroring spec §4.4 step 4's literal two-phase
//! description.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediation_cache::ResponseCache;
use mediation_config::{LeaseExpiryPolicy, MediationConfig};
use mediation_core::{
    CooldownConfig, CooldownController, EventListeners, Fingerprint, KvStore, Operation, Provider, UserId,
};
use mediation_quota::QuotaLedger;
use mediation_queue::{DrainHandler, DrainOutcome, QueuedRequest, RequestQueue};
use mediation_ratelimit::{AdmitOutcome, RateLimiterConfig, SlidingWindowLimiter, WindowType};
use tokio::sync::RwLock;

use crate::decision::{AdmitRequest, CompletionOutcome, Decision, RejectReason, UpstreamLease};
use crate::error::CoordinatorError;
use crate::events::CoordinatorEvent;

struct DegradedLimiter<S: KvStore> {
    limit: usize,
    limiter: Arc<SlidingWindowLimiter<S>>,
}

pub struct RateLimitCoordinator<S: KvStore> {
    store: Arc<S>,
    config: Arc<MediationConfig>,
    cache: ResponseCache<S>,
    limiters: HashMap<Provider, SlidingWindowLimiter<S>>,
    /// Lazily built, reduced-limit stand-in limiters used while a provider is
    /// in cool-down; keyed so a changing `effective_limit` rebuilds rather
    /// than silently keeps using a stale ceiling.
    degraded: RwLock<HashMap<Provider, DegradedLimiter<S>>>,
    quota: QuotaLedger<S>,
    queue: Arc<RequestQueue<S>>,
    cooldowns: HashMap<Provider, CooldownController>,
    event_listeners: EventListeners<CoordinatorEvent>,
    holder_seq: AtomicU64,
    instance_id: String,
}

impl<S: KvStore> RateLimitCoordinator<S> {
    pub fn new(store: Arc<S>, config: Arc<MediationConfig>) -> Self {
        Self::with_instance_id(store, config, format!("coordinator-{}", std::process::id()))
    }

    pub fn with_instance_id(store: Arc<S>, config: Arc<MediationConfig>, instance_id: String) -> Self {
        let mut limiters = HashMap::new();
        let mut cooldowns = HashMap::new();

        for provider in Provider::ALL {
            let rl = config.rate_limit(provider);
            let limiter_config = Arc::new(
                RateLimiterConfig::builder()
                    .name(provider.as_str())
                    .window_type(WindowType::SlidingLog)
                    .limit_for_period(rl.requests_per_window)
                    .window(rl.window())
                    .build(),
            );
            limiters.insert(provider, SlidingWindowLimiter::new(Arc::clone(&store), limiter_config));
            cooldowns.insert(
                provider,
                CooldownController::new(
                    CooldownConfig::new()
                        .with_initial_limit(rl.requests_per_window)
                        .with_max_limit(rl.requests_per_window)
                        .with_min_limit(1),
                ),
            );
        }

        Self {
            cache: ResponseCache::new(Arc::clone(&store)),
            quota: QuotaLedger::new(Arc::clone(&store)),
            queue: Arc::new(RequestQueue::new(Arc::clone(&store))),
            limiters,
            degraded: RwLock::new(HashMap::new()),
            cooldowns,
            event_listeners: EventListeners::new(),
            holder_seq: AtomicU64::new(0),
            instance_id,
            store,
            config,
        }
    }

    /// Shares an externally owned queue instead of the one created by `new`,
    /// so the same instance backs both `admit`'s queue-fallback path and a
    /// [`mediation_queue::QueueScheduler`] draining it in the background.
    pub fn with_queue(mut self, queue: Arc<RequestQueue<S>>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_event_listeners(mut self, event_listeners: EventListeners<CoordinatorEvent>) -> Self {
        self.event_listeners = event_listeners;
        self
    }

    pub fn queue(&self) -> Arc<RequestQueue<S>> {
        Arc::clone(&self.queue)
    }

    /// The underlying store, exposed read-only for health checks and admin
    /// tooling (spec §6's "health endpoint that reports store connectivity").
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Force-invalidates every cached entry whose fingerprint starts with
    /// `fingerprint_prefix`, for every provider (spec §6's operator
    /// endpoint). Returns the number of entries removed.
    pub async fn invalidate_cache_prefix(&self, fingerprint_prefix: &str) -> Result<usize, CoordinatorError> {
        let mut total = 0;
        for provider in Provider::ALL {
            total += self.cache.invalidate(&format!("{}:{fingerprint_prefix}", provider.as_str())).await?;
        }
        Ok(total)
    }

    /// Current quota usage and cap for `(provider, user, tier)`, without
    /// charging anything — used by `mediation-middleware` to populate the
    /// `X-Rate-Limit-*` response headers spec §4.8 requires on every
    /// response, not just rejections.
    pub async fn usage_snapshot(&self, provider: Provider, user: &UserId, tier: mediation_core::Tier) -> Result<(u32, u32), CoordinatorError> {
        let current = self.quota.current_usage(provider, user).await?;
        Ok((current, self.config.tier_cap(tier, provider)))
    }

    /// Next UTC midnight as a unix timestamp (spec §4.3's `reset_epoch`);
    /// exposed so `mediation-middleware` can populate `X-Rate-Limit-Reset`
    /// on responses that didn't themselves go through a quota charge.
    pub fn reset_epoch(&self) -> i64 {
        self.quota.reset_epoch()
    }

    fn lease_key(scope: &str, fingerprint: &Fingerprint) -> String {
        format!("lock:sf:{scope}:{fingerprint}")
    }

    /// Checks rate-limit admission, substituting a reduced-limit stand-in
    /// limiter while the provider is in cool-down (spec §4.5 scenario 5).
    async fn admit_with_cooldown(&self, provider: Provider, user: &UserId) -> Result<AdmitOutcome, CoordinatorError> {
        let cooldown = self.cooldowns.get(&provider).expect("every Provider::ALL has a cooldown controller");
        if !cooldown.is_in_cooldown() {
            return Ok(self.limiters.get(&provider).expect("every Provider::ALL has a limiter").admit(provider, user).await?);
        }

        let effective = cooldown.effective_limit();
        {
            let degraded = self.degraded.read().await;
            if let Some(entry) = degraded.get(&provider) {
                if entry.limit == effective {
                    return Ok(entry.limiter.admit(provider, user).await?);
                }
            }
        }

        let mut degraded = self.degraded.write().await;
        let window = self.config.rate_limit(provider).window();
        let limiter_config = Arc::new(
            RateLimiterConfig::builder()
                .name(format!("{provider}-cooldown"))
                .window_type(WindowType::SlidingLog)
                .limit_for_period(effective)
                .window(window)
                .build(),
        );
        let limiter = Arc::new(SlidingWindowLimiter::new(Arc::clone(&self.store), limiter_config));
        degraded.insert(provider, DegradedLimiter { limit: effective, limiter: Arc::clone(&limiter) });
        Ok(limiter.admit(provider, user).await?)
    }

    /// Spec §4.5's admission state machine: cache lookup, rate check, quota
    /// charge, then single-flight lease acquisition.
    pub async fn admit(&self, request: AdmitRequest) -> Result<Decision, CoordinatorError> {
        let AdmitRequest { provider, operation, user, tier, normalized_params, priority, allow_queue, deadline } =
            request;
        let operation = Operation::from(operation.as_str());

        let cost = self
            .config
            .operation_cost(provider, &operation)
            .ok_or_else(|| CoordinatorError::UnknownOperation { operation: operation.to_string() })?;

        let scope = format!("{provider}:{user}");
        let fingerprint = Fingerprint::new(provider, &operation, &normalized_params, None, 1);

        let lookup = self.cache.lookup(&scope, &fingerprint).await?;
        if lookup.hit && !lookup.is_negative {
            if self.config.rate_limits.count_cache_hits {
                let _ = self.admit_with_cooldown(provider, &user).await;
            }
            self.emit_admitted(provider, &user, "cache_hit");
            return Ok(Decision::ServeCached(lookup.value.unwrap_or_default()));
        }

        let rate_outcome = self.admit_with_cooldown(provider, &user).await?;
        let cap = self.config.tier_cap(tier, provider);

        if !rate_outcome.allowed {
            // Peek the quota ledger (without charging) so a request that
            // would fail both checks surfaces the quota reason, per spec
            // §9's tie-break note.
            let current_usage = self.quota.current_usage(provider, &user).await?;
            if current_usage.saturating_add(cost) > cap {
                self.emit_rejected(provider, &user, "quota");
                return Ok(Decision::Reject(RejectReason::Quota {
                    current_usage,
                    limit: cap,
                    reset_epoch: self.quota.reset_epoch(),
                }));
            }

            if allow_queue {
                let effective_priority = priority.saturating_add(tier.base_priority());
                let max_depth = self.config.queue.max_depth_per_user;
                return match self
                    .queue
                    .enqueue(&user, provider, &operation.0, &normalized_params, effective_priority, deadline, max_depth)
                    .await
                {
                    Ok(outcome) => {
                        self.emit_admitted(provider, &user, "queued");
                        Ok(Decision::Queue { position: outcome.position, eta: rate_outcome.retry_after })
                    }
                    Err(mediation_queue::QueueError::QueueFull { max_depth }) => {
                        self.emit_rejected(provider, &user, "queue_full");
                        Ok(Decision::Reject(RejectReason::QueueFull { max_queue_depth: max_depth }))
                    }
                    Err(e) => Err(e.into()),
                };
            }

            self.emit_rejected(provider, &user, "rate");
            return Ok(Decision::Reject(RejectReason::Rate { retry_after: rate_outcome.retry_after }));
        }

        let charge = self.quota.charge(provider, &user, &operation, cost, Some(cap)).await?;
        if !charge.charged {
            self.emit_rejected(provider, &user, "quota");
            return Ok(Decision::Reject(RejectReason::Quota {
                current_usage: charge.current,
                limit: charge.cap,
                reset_epoch: charge.reset_epoch,
            }));
        }

        let (positive_ttl, negative_ttl) = match self.config.cache_ttl(provider, &operation) {
            Some(entry) => (entry.positive(), entry.negative()),
            None => (Duration::ZERO, Duration::ZERO),
        };

        let holder = format!("{}-{}", self.instance_id, self.holder_seq.fetch_add(1, Ordering::Relaxed));
        let lease_key = Self::lease_key(&scope, &fingerprint);
        let lease_ttl = self.config.lease_ttl();

        if self.store.acquire_lease(&lease_key, &holder, lease_ttl).await? {
            self.emit_admitted(provider, &user, "dispatch");
            return Ok(Decision::CallUpstream(UpstreamLease {
                provider,
                user,
                scope,
                fingerprint,
                holder,
                cost,
                positive_ttl,
                negative_ttl,
                lease_acquired: true,
            }));
        }

        // Lost the single-flight race: poll the cache for the leader's
        // result until the configured slack elapses (spec §4.4 step 4).
        let poll_interval = Duration::from_millis(50);
        let poll_slack = self.config.poll_slack();
        let deadline_at = tokio::time::Instant::now() + poll_slack;
        loop {
            tokio::time::sleep(poll_interval).await;
            let lookup = self.cache.lookup(&scope, &fingerprint).await?;
            if lookup.hit && !lookup.is_negative {
                self.emit_admitted(provider, &user, "single_flight_wait_hit");
                return Ok(Decision::ServeCached(lookup.value.unwrap_or_default()));
            }
            if tokio::time::Instant::now() >= deadline_at {
                break;
            }
        }

        match self.config.singleflight.on_lease_expiry {
            LeaseExpiryPolicy::Proceed => {
                self.emit_admitted(provider, &user, "dispatch_raced");
                Ok(Decision::CallUpstream(UpstreamLease {
                    provider,
                    user,
                    scope,
                    fingerprint,
                    holder,
                    cost,
                    positive_ttl,
                    negative_ttl,
                    lease_acquired: false,
                }))
            }
            LeaseExpiryPolicy::Contention => {
                self.emit_rejected(provider, &user, "single_flight_contention");
                Ok(Decision::Reject(RejectReason::Rate { retry_after: poll_interval }))
            }
        }
    }

    /// Reports the outcome of a dispatch (or abandonment) started by a prior
    /// `admit` call that returned [`Decision::CallUpstream`] (spec §4.5).
    pub async fn complete(&self, lease: UpstreamLease, outcome: CompletionOutcome) -> Result<(), CoordinatorError> {
        if lease.lease_acquired {
            let lease_key = Self::lease_key(&lease.scope, &lease.fingerprint);
            self.store.release_lease(&lease_key, &lease.holder).await?;
        }

        match outcome {
            CompletionOutcome::Success(value) => {
                self.cache.store(&lease.scope, &lease.fingerprint, &value, lease.positive_ttl, false).await?;
                if let Some(cooldown) = self.cooldowns.get(&lease.provider) {
                    cooldown.on_success();
                }
                self.emit_completed(lease.provider, &lease.user, "success");
            }
            CompletionOutcome::ProviderError => {
                self.cache.store(&lease.scope, &lease.fingerprint, b"", lease.negative_ttl, true).await?;
                self.emit_completed(lease.provider, &lease.user, "provider_error");
            }
            CompletionOutcome::ProviderThrottled => {
                self.cache.store(&lease.scope, &lease.fingerprint, b"", lease.negative_ttl, true).await?;
                if let Some(cooldown) = self.cooldowns.get(&lease.provider) {
                    cooldown.on_provider_throttled();
                }
                self.emit_completed(lease.provider, &lease.user, "provider_throttled");
            }
            CompletionOutcome::AbortedBeforeDispatch => {
                self.quota.compensate(lease.provider, &lease.user, lease.cost).await?;
                self.emit_completed(lease.provider, &lease.user, "aborted_before_dispatch");
            }
        }

        Ok(())
    }

    fn emit_admitted(&self, provider: Provider, user: &UserId, decision: &'static str) {
        self.event_listeners.emit(&CoordinatorEvent::Admitted {
            provider,
            user: user.to_string(),
            timestamp: std::time::Instant::now(),
            decision,
        });
        #[cfg(feature = "metrics")]
        metrics::counter!("mediation_coordinator_admitted_total", "provider" => provider.as_str(), "decision" => decision)
            .increment(1);
    }

    fn emit_rejected(&self, provider: Provider, user: &UserId, reason: &'static str) {
        self.event_listeners.emit(&CoordinatorEvent::Rejected {
            provider,
            user: user.to_string(),
            timestamp: std::time::Instant::now(),
            reason,
        });
        #[cfg(feature = "metrics")]
        metrics::counter!("mediation_coordinator_rejected_total", "provider" => provider.as_str(), "reason" => reason)
            .increment(1);
    }

    fn emit_completed(&self, provider: Provider, user: &UserId, outcome: &'static str) {
        self.event_listeners.emit(&CoordinatorEvent::Completed {
            provider,
            user: user.to_string(),
            timestamp: std::time::Instant::now(),
            outcome,
        });
        #[cfg(feature = "metrics")]
        metrics::counter!("mediation_coordinator_completed_total", "provider" => provider.as_str(), "outcome" => outcome)
            .increment(1);
    }
}

/// Lets [`mediation_queue::QueueScheduler`] drain this coordinator's queue
/// without the queue crate depending on this one (spec §9 REDESIGN FLAGS).
///
/// A queued request only ever got here because the rate limiter denied it —
/// quota-denied requests are rejected immediately in `admit` and never
/// enqueued — so draining only has to re-check rate headroom. Actually
/// dispatching the now-admitted request upstream and delivering its result
/// to the original caller is outside this trait's contract; callers that
/// rely on queueing own that delivery path.
#[async_trait]
impl<S: KvStore> DrainHandler for RateLimitCoordinator<S> {
    async fn try_admit(&self, request: &QueuedRequest) -> DrainOutcome {
        let user = request.user_id();
        match self.admit_with_cooldown(request.provider, &user).await {
            Ok(outcome) if outcome.allowed => DrainOutcome::Dispatched,
            _ => DrainOutcome::StillDenied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediation_core::{InMemoryStore, Tier};

    const CONFIG_TOML: &str = r#"
        [tiers.free]
        video = 100

        [tiers.premium]
        video = 1000

        [operation_costs.video]
        search = 1
        transcode = 50

        [cache_ttl.video.search]
        positive_seconds = 300
        negative_seconds = 10

        [rate_limits.video]
        requests_per_window = 3
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

    fn coordinator() -> RateLimitCoordinator<InMemoryStore> {
        let config = Arc::new(MediationConfig::from_toml_str(CONFIG_TOML, None).unwrap());
        RateLimitCoordinator::new(InMemoryStore::new(), config)
    }

    fn request(user: &str, allow_queue: bool) -> AdmitRequest {
        AdmitRequest {
            provider: Provider::Video,
            operation: "search".to_string(),
            user: UserId::from(user),
            tier: Tier::Free,
            normalized_params: "q=lofi".to_string(),
            priority: 0,
            allow_queue,
            deadline: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn first_call_dispatches_then_second_identical_call_hits_cache() {
        let coordinator = coordinator();

        let decision = coordinator.admit(request("alice", false)).await.unwrap();
        let lease = match decision {
            Decision::CallUpstream(lease) => lease,
            other => panic!("expected CallUpstream, got {other:?}"),
        };
        coordinator.complete(lease, CompletionOutcome::Success(b"results".to_vec())).await.unwrap();

        let decision = coordinator.admit(request("alice", false)).await.unwrap();
        match decision {
            Decision::ServeCached(value) => assert_eq!(value, b"results".to_vec()),
            other => panic!("expected ServeCached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_hit_does_not_consume_rate_budget() {
        let coordinator = coordinator();
        let decision = coordinator.admit(request("alice", false)).await.unwrap();
        let lease = match decision {
            Decision::CallUpstream(lease) => lease,
            other => panic!("expected CallUpstream, got {other:?}"),
        };
        coordinator.complete(lease, CompletionOutcome::Success(b"r".to_vec())).await.unwrap();

        // requests_per_window is 3; exhaust it entirely via cache hits, which
        // should never be denied since count_cache_hits defaults to false.
        for _ in 0..10 {
            let decision = coordinator.admit(request("alice", false)).await.unwrap();
            assert!(matches!(decision, Decision::ServeCached(_)));
        }
    }

    #[tokio::test]
    async fn rate_exceeded_rejects_when_queue_disallowed() {
        let coordinator = coordinator();
        for i in 0..3 {
            let decision = coordinator.admit(request(&format!("bob{i}"), false)).await.unwrap();
            assert!(matches!(decision, Decision::CallUpstream(_)));
        }

        // Same user repeated past the 3-per-window limit (requests differ by
        // normalized params to avoid cache hits).
        let mut req = request("bob-repeat", false);
        for _ in 0..3 {
            req.normalized_params = format!("q={}", uuid_like());
            let decision = coordinator.admit(req.clone()).await.unwrap();
            assert!(matches!(decision, Decision::CallUpstream(_)));
        }
        req.normalized_params = format!("q={}", uuid_like());
        let decision = coordinator.admit(req).await.unwrap();
        assert!(matches!(decision, Decision::Reject(RejectReason::Rate { .. })));
    }

    #[tokio::test]
    async fn rate_exceeded_queues_when_allowed() {
        let coordinator = coordinator();
        let mut req = request("carol", true);
        for _ in 0..3 {
            req.normalized_params = format!("q={}", uuid_like());
            coordinator.admit(req.clone()).await.unwrap();
        }
        req.normalized_params = format!("q={}", uuid_like());
        let decision = coordinator.admit(req).await.unwrap();
        match decision {
            Decision::Queue { position, .. } => assert_eq!(position, 1),
            other => panic!("expected Queue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quota_exhaustion_rejects_even_with_rate_headroom() {
        let config = Arc::new(MediationConfig::from_toml_str(CONFIG_TOML, None).unwrap());
        let coordinator = RateLimitCoordinator::new(InMemoryStore::new(), config);

        let mut req = AdmitRequest {
            provider: Provider::Video,
            operation: "transcode".to_string(),
            user: UserId::from("dana"),
            tier: Tier::Free,
            normalized_params: "job=1".to_string(),
            priority: 0,
            allow_queue: false,
            deadline: Duration::from_secs(30),
        };
        // Free tier cap is 100, transcode costs 50: two charges exhaust it.
        for i in 0..2 {
            req.normalized_params = format!("job={i}");
            let decision = coordinator.admit(req.clone()).await.unwrap();
            assert!(matches!(decision, Decision::CallUpstream(_)));
        }
        req.normalized_params = "job=3".to_string();
        let decision = coordinator.admit(req).await.unwrap();
        assert!(matches!(decision, Decision::Reject(RejectReason::Quota { .. })));
    }

    #[tokio::test]
    async fn unknown_operation_is_a_hard_error() {
        let coordinator = coordinator();
        let mut req = request("erin", false);
        req.operation = "nonexistent".to_string();
        let err = coordinator.admit(req).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownOperation { .. }));
    }

    #[tokio::test]
    async fn concurrent_caller_races_into_dispatch_after_poll_slack_expires() {
        let coordinator = coordinator();
        let first = coordinator.admit(request("frank", false)).await.unwrap();
        let _first_lease = match first {
            Decision::CallUpstream(lease) => lease,
            other => panic!("expected CallUpstream, got {other:?}"),
        };

        // Second caller for the exact same fingerprint races in while the
        // first lease is still held; poll_slack_seconds is 0 so it should
        // proceed without ever completing (default LeaseExpiryPolicy::Proceed).
        let second = coordinator.admit(request("frank", false)).await.unwrap();
        match second {
            Decision::CallUpstream(lease) => assert!(!lease.lease_acquired),
            other => panic!("expected a raced CallUpstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_throttle_engages_cooldown_and_shrinks_effective_limit() {
        let coordinator = coordinator();
        let decision = coordinator.admit(request("gina", false)).await.unwrap();
        let lease = match decision {
            Decision::CallUpstream(lease) => lease,
            other => panic!("expected CallUpstream, got {other:?}"),
        };
        coordinator.complete(lease, CompletionOutcome::ProviderThrottled).await.unwrap();

        // The cooldown-scoped limiter starts fresh (separate key), so a
        // request against it is still admitted, but the provider is now
        // flagged as degraded.
        assert!(coordinator.cooldowns.get(&Provider::Video).unwrap().is_in_cooldown());
    }

    fn uuid_like() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}
