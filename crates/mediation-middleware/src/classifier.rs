//! The embedder-supplied seam that extracts `(user, tier)` and classifies
//! the inbound request into a provider operation (spec §4.8: "extract
//! `(user, tier)`, classify the operation"). Authentication, routing
//! convention, and parameter normalization are all out of scope here (spec
//! §1's "out of scope: HTTP framework glue... OAuth flows") — this trait is
//! the one seam the core exposes for an embedder to plug those in.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use mediation_core::{Priority, Provider, Tier, UserId};

/// Everything [`crate::AdmissionMiddleware`] needs from one inbound request
/// to call [`mediation_coordinator::RateLimitCoordinator::admit`].
#[derive(Debug, Clone)]
pub struct AdmissionParams {
    pub user: UserId,
    pub tier: Tier,
    pub provider: Provider,
    pub operation: String,
    pub normalized_params: String,
    pub priority: Priority,
    pub allow_queue: bool,
    pub deadline: Duration,
}

/// Implemented once per embedding application. Returning `None` means this
/// request does not target a mediated provider operation at all (e.g. a
/// health-check route) — the middleware passes it straight through to the
/// inner service with no admission check and no rate-limit headers.
#[async_trait]
pub trait AdmissionClassifier: Send + Sync + 'static {
    async fn classify(&self, request: &Request) -> Option<AdmissionParams>;
}

/// A classifier built from a plain closure, for the common case where
/// classification doesn't need `self` state beyond what the closure
/// captures — mirrors `tower_resilience_circuitbreaker`'s `FnClassifier`.
pub struct FnClassifier<F>(pub F);

#[async_trait]
impl<F> AdmissionClassifier for FnClassifier<F>
where
    F: Fn(&Request) -> Option<AdmissionParams> + Send + Sync + 'static,
{
    async fn classify(&self, request: &Request) -> Option<AdmissionParams> {
        (self.0)(request)
    }
}
