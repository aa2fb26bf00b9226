//! The background prefetch orchestrator (spec §4.7, component C7).
//!
//! Trigger plumbing is grounded on
//! `tower_resilience_healthcheck`'s enum-of-trigger-sources-driving-a-
//! scheduler-task shape: sign-in and cache-near-expiry triggers call
//! [`PrefetchOrchestrator::warm_one`] directly, while the periodic sweep
//! (spec §4.7 trigger (c)) is a `tokio::time::interval` loop over
//! [`crate::target::TargetRegistry::active_targets`], mirroring
//! `mediation_queue::QueueScheduler`'s start/stop/tick shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mediation_config::PrefetchConfig;
use mediation_core::{
    EventListeners, KvStore, Operation, Provider, UpstreamAdapter, UpstreamStatus,
};
use mediation_coordinator::{AdmitRequest, CompletionOutcome, Decision, RateLimitCoordinator};
use tokio::sync::RwLock as AsyncRwLock;
use tokio::task::JoinHandle;

use crate::events::PrefetchEvent;
use crate::lease::PrefetchLease;
use crate::target::{PrefetchTarget, TargetRegistry};

/// Warms recommendation fingerprints for active users (spec §4.7).
/// Prefetch is strictly subordinate to foreground traffic: every admission
/// it issues goes through the same [`RateLimitCoordinator::admit`] path the
/// foreground middleware uses, with `priority = 0` and `allow_queue =
/// false`, so it never displaces a user-facing request and never itself
/// queues (spec §5's back-pressure rule).
pub struct PrefetchOrchestrator<S: KvStore> {
    coordinator: Arc<RateLimitCoordinator<S>>,
    adapter: Arc<dyn UpstreamAdapter>,
    registry: TargetRegistry<S>,
    lease: PrefetchLease<S>,
    config: PrefetchConfig,
    event_listeners: EventListeners<PrefetchEvent>,
    holder_seq: AtomicU64,
    instance_id: String,
    task: AsyncRwLock<Option<JoinHandle<()>>>,
}

impl<S: KvStore> PrefetchOrchestrator<S> {
    pub fn new(store: Arc<S>, coordinator: Arc<RateLimitCoordinator<S>>, adapter: Arc<dyn UpstreamAdapter>, config: PrefetchConfig) -> Self {
        let lease_ttl = Duration::from_secs(config.lease_ttl_seconds);
        Self {
            registry: TargetRegistry::new(Arc::clone(&store)),
            lease: PrefetchLease::new(store, lease_ttl),
            coordinator,
            adapter,
            config,
            event_listeners: EventListeners::new(),
            holder_seq: AtomicU64::new(0),
            instance_id: format!("prefetch-{}", std::process::id()),
            task: AsyncRwLock::new(None),
        }
    }

    pub fn with_event_listeners(mut self, event_listeners: EventListeners<PrefetchEvent>) -> Self {
        self.event_listeners = event_listeners;
        self
    }

    /// Trigger source (a): registers a target so the periodic sweep picks it
    /// up, then warms it immediately rather than waiting a full interval —
    /// the whole point of "warm on sign-in" is that the first post-login
    /// request should already be cached.
    pub async fn on_sign_in(&self, target: PrefetchTarget) -> Result<(), mediation_core::StoreError> {
        self.registry.register(&target).await?;
        if self.config.enabled {
            self.warm_one(&target).await;
        }
        Ok(())
    }

    /// Trigger source (b): a cache-near-expiry notification for a fingerprint
    /// already being tracked. Re-warming an existing target is the same
    /// operation as the periodic sweep's per-target step, so this just
    /// re-dispatches `warm_one` against the caller-supplied target.
    pub async fn on_cache_near_expiry(&self, target: &PrefetchTarget) {
        if self.config.enabled {
            self.warm_one(target).await;
        }
    }

    /// Spawns the periodic sweep (trigger source (c)).
    pub async fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            return;
        }
        let this = Arc::clone(self);
        let interval = Duration::from_secs(this.config.interval_seconds);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                this.sweep_once().await;
            }
        });
        *self.task.write().await = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.write().await.take() {
            handle.abort();
        }
    }

    /// Runs one sweep over every currently-registered active target.
    pub async fn sweep_once(&self) {
        let targets = match self.registry.active_targets().await {
            Ok(targets) => targets,
            Err(_) => return,
        };
        for target in &targets {
            self.warm_one(target).await;
        }
    }

    /// One target's full warm attempt: acquire the prefetch lease, admit
    /// through the coordinator at low priority with queuing disabled,
    /// dispatch on `CallUpstream`, drop silently on `Queue`/`Reject` (spec
    /// §4.7 steps 1-4).
    async fn warm_one(&self, target: &PrefetchTarget) {
        let operation = target.operation();
        let fingerprint = mediation_core::Fingerprint::new(target.provider, &operation, &target.normalized_params, None, 1);
        let holder = format!("{}-{}", self.instance_id, self.holder_seq.fetch_add(1, Ordering::Relaxed));

        let held = match self.lease.try_acquire(&fingerprint, &holder).await {
            Ok(Some(held)) => held,
            Ok(None) => {
                self.emit(PrefetchEvent::LeaseContended {
                    provider: target.provider,
                    user: target.user.clone(),
                    timestamp: std::time::Instant::now(),
                });
                return;
            }
            Err(_) => return,
        };

        self.dispatch_once(target, &operation).await;
        let _ = held.release().await;
    }

    async fn dispatch_once(&self, target: &PrefetchTarget, operation: &Operation) {
        let request = AdmitRequest {
            provider: target.provider,
            operation: operation.0.clone(),
            user: target.user_id(),
            tier: target.tier,
            normalized_params: target.normalized_params.clone(),
            priority: 0,
            allow_queue: false,
            deadline: Duration::from_secs(30),
        };

        let decision = match self.coordinator.admit(request).await {
            Ok(decision) => decision,
            Err(_) => return,
        };

        match decision {
            Decision::CallUpstream(lease) => {
                let result = self.adapter.dispatch(target.provider, operation, &target.normalized_params).await;
                let outcome = match result {
                    Ok(response) => match response.status {
                        UpstreamStatus::Success => CompletionOutcome::Success(response.payload),
                        UpstreamStatus::Error => CompletionOutcome::ProviderError,
                        UpstreamStatus::Throttled => CompletionOutcome::ProviderThrottled,
                    },
                    Err(_) => CompletionOutcome::ProviderError,
                };
                let _ = self.coordinator.complete(lease, outcome).await;
                self.emit(PrefetchEvent::Warmed { provider: target.provider, user: target.user.clone(), timestamp: std::time::Instant::now() });
            }
            Decision::ServeCached(_) => {
                // Already warm — another holder (a user request or a
                // concurrent sweep elsewhere) beat us to it.
            }
            Decision::Queue { .. } => {
                self.emit(PrefetchEvent::Skipped {
                    provider: target.provider,
                    user: target.user.clone(),
                    timestamp: std::time::Instant::now(),
                    reason: "queue",
                });
            }
            Decision::Reject(_) => {
                self.emit(PrefetchEvent::Skipped {
                    provider: target.provider,
                    user: target.user.clone(),
                    timestamp: std::time::Instant::now(),
                    reason: "reject",
                });
            }
        }
    }

    fn emit(&self, event: PrefetchEvent) {
        self.event_listeners.emit(&event);
    }
}
