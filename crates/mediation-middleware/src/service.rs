//! [`AdmissionMiddleware`]: the `Service<Request>` produced by
//! [`crate::AdmissionLayer`]. `poll_ready`/boxed-`call` shape grounded on
//! `tower_resilience_circuitbreaker::CircuitBreaker`'s `Service` impl.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::{IntoResponse, Json, Response};
use futures::future::BoxFuture;
use http::StatusCode;
use mediation_core::KvStore;
use mediation_coordinator::{AdmitRequest, CompletionOutcome, CoordinatorError, Decision, RateLimitCoordinator, RejectReason};
use tower::Service;

use crate::body::AdmissionErrorBody;
use crate::classifier::AdmissionClassifier;
use crate::headers::{CacheStatus, RateLimitHeaders};

/// One megabyte: generous enough for any mediated provider's JSON payload
/// while bounding how much of an upstream response this middleware buffers
/// in memory to hand to `coordinator.complete()`.
const MAX_BUFFERED_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AdmissionMiddleware<Svc, S: KvStore, C: AdmissionClassifier> {
    inner: Svc,
    coordinator: Arc<RateLimitCoordinator<S>>,
    classifier: Arc<C>,
}

impl<Svc, S: KvStore, C: AdmissionClassifier> AdmissionMiddleware<Svc, S, C> {
    pub fn new(inner: Svc, coordinator: Arc<RateLimitCoordinator<S>>, classifier: Arc<C>) -> Self {
        Self { inner, coordinator, classifier }
    }
}

impl<Svc, S, C> Service<Request> for AdmissionMiddleware<Svc, S, C>
where
    Svc: Service<Request, Response = Response> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
    S: KvStore,
    C: AdmissionClassifier,
{
    type Response = Response;
    type Error = Svc::Error;
    type Future = BoxFuture<'static, Result<Response, Svc::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let coordinator = Arc::clone(&self.coordinator);
        let classifier = Arc::clone(&self.classifier);

        Box::pin(async move {
            let Some(params) = classifier.classify(&request).await else {
                return inner.call(request).await;
            };

            let usage = coordinator.usage_snapshot(params.provider, &params.user, params.tier).await.ok();
            let user_id = params.user.to_string();

            let decision = coordinator
                .admit(AdmitRequest {
                    provider: params.provider,
                    operation: params.operation.clone(),
                    user: params.user.clone(),
                    tier: params.tier,
                    normalized_params: params.normalized_params.clone(),
                    priority: params.priority,
                    allow_queue: params.allow_queue,
                    deadline: params.deadline,
                })
                .await;

            let decision = match decision {
                Ok(decision) => decision,
                Err(CoordinatorError::UnknownOperation { operation }) => {
                    return Ok(json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        AdmissionErrorBody::unknown_operation(&user_id, &operation),
                        None,
                        CacheStatus::Bypass,
                    ));
                }
                Err(CoordinatorError::StoreUnavailable(_)) => {
                    return Ok(json_response(
                        StatusCode::SERVICE_UNAVAILABLE,
                        AdmissionErrorBody::store_unavailable(&user_id),
                        None,
                        CacheStatus::Bypass,
                    ));
                }
            };

            match decision {
                Decision::ServeCached(payload) => {
                    let mut response = (StatusCode::OK, payload).into_response();
                    if let Some((used, limit)) = usage {
                        RateLimitHeaders { limit, used, reset_epoch: coordinator.reset_epoch() }
                            .apply(response.headers_mut(), CacheStatus::Hit);
                    }
                    Ok(response)
                }
                Decision::Reject(RejectReason::Rate { retry_after }) => Ok(json_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    AdmissionErrorBody::rate_denied(&user_id, retry_after.as_secs()),
                    usage,
                    CacheStatus::Bypass,
                )),
                Decision::Reject(RejectReason::Quota { current_usage, limit, reset_epoch }) => {
                    let mut response = json_response(
                        StatusCode::TOO_MANY_REQUESTS,
                        AdmissionErrorBody::quota_denied(&user_id, current_usage, limit, reset_epoch),
                        Some((current_usage, limit)),
                        CacheStatus::Bypass,
                    );
                    response.headers_mut().insert(crate::headers::X_RATE_LIMIT_RESET, reset_epoch.to_string().parse().unwrap());
                    Ok(response)
                }
                Decision::Reject(RejectReason::QueueFull { max_queue_depth }) => Ok(json_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    AdmissionErrorBody::queue_full(&user_id, max_queue_depth),
                    usage,
                    CacheStatus::Bypass,
                )),
                Decision::Queue { position, eta } => Ok(json_response(
                    StatusCode::ACCEPTED,
                    AdmissionErrorBody::queued(&user_id, position, eta.as_secs()),
                    usage,
                    CacheStatus::Bypass,
                )),
                Decision::CallUpstream(lease) => {
                    let response = inner.call(request).await?;
                    let status = response.status();
                    let (parts, body) = response.into_parts();
                    let bytes = to_bytes(body, MAX_BUFFERED_BODY_BYTES).await.unwrap_or_default();

                    let outcome = if status == StatusCode::TOO_MANY_REQUESTS {
                        CompletionOutcome::ProviderThrottled
                    } else if status.is_server_error() {
                        CompletionOutcome::ProviderError
                    } else {
                        CompletionOutcome::Success(bytes.to_vec())
                    };
                    let _ = coordinator.complete(lease, outcome).await;

                    let mut response = Response::from_parts(parts, Body::from(bytes));
                    if let Some((used, limit)) = usage {
                        RateLimitHeaders { limit: limit.max(1), used, reset_epoch: coordinator.reset_epoch() }
                            .apply(response.headers_mut(), CacheStatus::Miss);
                    }
                    Ok(response)
                }
            }
        })
    }
}

fn json_response(status: StatusCode, body: AdmissionErrorBody, usage: Option<(u32, u32)>, cache_status: CacheStatus) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Some((used, limit)) = usage {
        RateLimitHeaders { limit, used, reset_epoch: 0 }.apply(response.headers_mut(), cache_status);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{AdmissionParams, FnClassifier};
    use crate::layer::AdmissionLayer;
    use mediation_config::MediationConfig;
    use mediation_core::{InMemoryStore, Priority, Tier, UserId};
    use tower::{Layer, ServiceExt};

    const CONFIG_TOML: &str = r#"
        [tiers.free]
        video = 2

        [operation_costs.video]
        search = 1

        [cache_ttl.video.search]
        positive_seconds = 300
        negative_seconds = 10

        [rate_limits.video]
        requests_per_window = 100
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

    /// Builds a request whose path is read back by the classifier below as
    /// the mediated operation's normalized params, so distinct paths land
    /// on distinct cache entries for the same user.
    fn request_with_path(path: &str) -> Request {
        Request::builder().uri(format!("https://example.test{path}")).body(Body::empty()).unwrap()
    }

    fn layer_for(user: &str) -> AdmissionLayer<InMemoryStore, impl AdmissionClassifier> {
        let config = Arc::new(MediationConfig::from_toml_str(CONFIG_TOML, None).unwrap());
        let coordinator = Arc::new(RateLimitCoordinator::new(InMemoryStore::new(), config));
        let user = user.to_string();
        AdmissionLayer::new(
            coordinator,
            FnClassifier(move |req: &Request| {
                Some(AdmissionParams {
                    user: UserId::from(user.clone()),
                    tier: Tier::Free,
                    provider: mediation_core::Provider::Video,
                    operation: "search".to_string(),
                    normalized_params: req.uri().path().to_string(),
                    priority: Priority::default(),
                    allow_queue: false,
                    deadline: std::time::Duration::from_secs(30),
                })
            }),
        )
    }

    async fn echo(_req: Request) -> Result<Response, std::convert::Infallible> {
        Ok((StatusCode::OK, "upstream-payload").into_response())
    }

    #[tokio::test]
    async fn first_call_dispatches_and_attaches_rate_limit_headers() {
        let layer = layer_for("alice");
        let service = layer.layer(tower::service_fn(echo));

        let response = service.oneshot(request_with_path("/search")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(crate::headers::X_RATE_LIMIT_LIMIT));
        assert_eq!(response.headers().get(crate::headers::X_CACHE_STATUS).unwrap(), "MISS");
    }

    #[tokio::test]
    async fn repeat_call_is_served_from_cache_with_hit_status() {
        let layer = layer_for("bob");
        let service = layer.layer(tower::service_fn(echo));

        let _ = service.clone().oneshot(request_with_path("/search")).await.unwrap();
        let second = service.oneshot(request_with_path("/search")).await.unwrap();

        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers().get(crate::headers::X_CACHE_STATUS).unwrap(), "HIT");
    }

    #[tokio::test]
    async fn quota_exhaustion_yields_429_with_structured_body() {
        let layer = layer_for("carol");
        let service = layer.layer(tower::service_fn(echo));

        // Free tier video cap is 2, search costs 1; distinct paths avoid the
        // cache so each call actually charges quota.
        let _ = service.clone().oneshot(request_with_path("/search?q=1")).await.unwrap();
        let _ = service.clone().oneshot(request_with_path("/search?q=2")).await.unwrap();

        let third = service.oneshot(request_with_path("/search?q=3")).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unclassified_request_passes_through_untouched() {
        let config = Arc::new(MediationConfig::from_toml_str(CONFIG_TOML, None).unwrap());
        let coordinator = Arc::new(RateLimitCoordinator::new(InMemoryStore::new(), config));
        let layer = AdmissionLayer::new(coordinator, FnClassifier(|_req: &Request| None));
        let service = layer.layer(tower::service_fn(echo));

        let response = service.oneshot(request_with_path("/unmediated")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(crate::headers::X_CACHE_STATUS));
    }
}
