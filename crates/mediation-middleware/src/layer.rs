use std::sync::Arc;

use mediation_core::KvStore;
use mediation_coordinator::RateLimitCoordinator;
use tower::Layer;

use crate::classifier::AdmissionClassifier;
use crate::service::AdmissionMiddleware;

/// A Tower [`Layer`] that applies admission control to an inner service
/// (spec §4.8, component C8). The inner service is the one thing this layer
/// does *not* reimplement: on [`mediation_coordinator::Decision::CallUpstream`]
/// it is invoked exactly once and its response is treated as the upstream's
/// result, fed back into `coordinator.complete()` once it returns — so the
/// inner service doubles as the "thin upstream adapter" spec §4.8(i)
/// describes.
///
/// ```
/// use mediation_middleware::{AdmissionLayer, FnClassifier};
/// use mediation_coordinator::RateLimitCoordinator;
/// use mediation_core::InMemoryStore;
/// use mediation_config::MediationConfig;
/// use std::sync::Arc;
/// use tower::ServiceBuilder;
///
/// # async fn example() {
/// let store = InMemoryStore::new();
/// let coordinator = Arc::new(RateLimitCoordinator::new(store, Arc::new(MediationConfig::default())));
/// let layer = AdmissionLayer::new(coordinator, FnClassifier(|_req: &axum::extract::Request| None));
/// let _ = ServiceBuilder::new().layer(layer);
/// # }
/// ```
#[derive(Clone)]
pub struct AdmissionLayer<S: KvStore, C: AdmissionClassifier> {
    coordinator: Arc<RateLimitCoordinator<S>>,
    classifier: Arc<C>,
}

impl<S: KvStore, C: AdmissionClassifier> AdmissionLayer<S, C> {
    pub fn new(coordinator: Arc<RateLimitCoordinator<S>>, classifier: C) -> Self {
        Self { coordinator, classifier: Arc::new(classifier) }
    }
}

impl<Svc, S: KvStore, C: AdmissionClassifier> Layer<Svc> for AdmissionLayer<S, C> {
    type Service = AdmissionMiddleware<Svc, S, C>;

    fn layer(&self, inner: Svc) -> Self::Service {
        AdmissionMiddleware::new(inner, Arc::clone(&self.coordinator), Arc::clone(&self.classifier))
    }
}
