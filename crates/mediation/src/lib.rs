//! Mediation layer facade: assembles the components of `mediation-core`
//! through `mediation-middleware` into one running stack.
//!
//! ```text
//! ┌─────────────┐
//! │   Request   │
//! └──────┬──────┘
//!        ▼
//! ┌───────────────────────┐
//! │  AdmissionLayer (C8)  │ ← classify, admit, shape 429/202/headers
//! └──────────┬────────────┘
//!            ▼
//! ┌───────────────────────┐
//! │ RateLimitCoordinator  │ ← cache (C4) → rate (C2) → quota (C3) → queue (C6)
//! │         (C5)          │
//! └──────────┬────────────┘
//!            ▼
//! ┌───────────────────────┐
//! │   UpstreamAdapter     │ ← embedder-supplied, one per provider
//! └───────────────────────┘
//!
//! alongside two background loops: the queue's round-robin drain
//! (`QueueScheduler`) and the prefetch orchestrator's sweep (`PrefetchOrchestrator`),
//! both reporting into `MetricsCollector`, which `AlertEvaluator` polls (C9).
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use mediation::MediationStack;
//! use mediation_config::MediationConfig;
//! use mediation_core::InMemoryStore;
//! use mediation_middleware::{AdmissionLayer, FnClassifier};
//! use std::sync::Arc;
//!
//! # struct EchoAdapter;
//! # #[async_trait::async_trait]
//! # impl mediation_core::UpstreamAdapter for EchoAdapter {
//! #     async fn dispatch(&self, _p: mediation_core::Provider, _o: &mediation_core::Operation, _params: &str)
//! #         -> Result<mediation_core::UpstreamResponse, mediation_core::UpstreamDispatchError> {
//! #         Ok(mediation_core::UpstreamResponse { payload: vec![], status: mediation_core::UpstreamStatus::Success, upstream_latency_ms: 1 })
//! #     }
//! # }
//! # async fn example() {
//! let store = InMemoryStore::new();
//! let config = Arc::new(MediationConfig::default());
//! let stack = MediationStack::build(store, config, Arc::new(EchoAdapter));
//! stack.start().await;
//!
//! let layer = AdmissionLayer::new(stack.coordinator.clone(), FnClassifier(|_req: &axum::extract::Request| None));
//! let _ = tower::ServiceBuilder::new().layer(layer);
//! # }
//! ```

mod bootstrap;

pub use bootstrap::MediationStack;

pub use mediation_cache::{CacheEvent, CacheLookup, ResponseCache};
pub use mediation_config::MediationConfig;
pub use mediation_coordinator::{AdmitRequest, CompletionOutcome, CoordinatorError, CoordinatorEvent, Decision, RateLimitCoordinator, RejectReason, UpstreamLease};
pub use mediation_core::{
    Cost, Deadline, Fingerprint, InMemoryStore, KvStore, MediationError, Operation, Priority, Provider, StoreError, Tier,
    UpstreamAdapter, UpstreamDispatchError, UpstreamResponse, UpstreamStatus, UserId,
};
pub use mediation_metrics::{AlertEvaluator, AlertEvent, AlertSeverity, MetricsCollector, MetricsSnapshot};
pub use mediation_middleware::{AdmissionClassifier, AdmissionErrorBody, AdmissionLayer, AdmissionParams, FnClassifier};
pub use mediation_prefetch::{PrefetchEvent, PrefetchOrchestrator, PrefetchTarget, TargetRegistry};
pub use mediation_queue::{QueueEvent, QueueScheduler, RequestQueue};
pub use mediation_quota::QuotaLedger;
pub use mediation_ratelimit::{RateLimitEvent, SlidingWindowLimiter};

#[cfg(feature = "redis-backend")]
pub use mediation_core::RedisStore;
