//! Admission middleware (spec §4.8, component C8): the Tower/axum layer an
//! embedding application wires in front of its provider-calling handlers.
//! Classifies each inbound request into a mediated operation, asks
//! [`mediation_coordinator::RateLimitCoordinator`] for a decision, and shapes
//! the response — cached payload, `429`, `202 Accepted` for queued requests,
//! or the inner service's own response with rate-limit headers applied.
//!
//! Everything outside that seam — authentication, routing, request parsing —
//! stays the embedder's problem (spec §1's declared out-of-scope list); the
//! one extension point is [`AdmissionClassifier`].

mod body;
mod classifier;
mod headers;
mod layer;
mod service;

pub use body::AdmissionErrorBody;
pub use classifier::{AdmissionClassifier, AdmissionParams, FnClassifier};
pub use headers::{CacheStatus, RateLimitHeaders, X_CACHE_STATUS, X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET, X_RATE_LIMIT_USED};
pub use layer::AdmissionLayer;
pub use service::AdmissionMiddleware;
