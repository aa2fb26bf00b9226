//! The upstream adapter contract (spec §6): one implementation per provider,
//! supplied by whatever embeds this workspace. Lives in `mediation-core`
//! rather than in `mediation-middleware` or `mediation-prefetch` because both
//! of those crates need to dispatch through it and neither should depend on
//! the other — the same cyclic-reference concern [`crate::kv::KvStore`]
//! and the queue's `DrainHandler` already solve by pulling the seam down
//! into the shared foundation crate.

use async_trait::async_trait;
use std::fmt;

use crate::domain::{Operation, Provider};

/// How the upstream provider responded, distinct from transport-level
/// failure to reach it at all (that's [`UpstreamDispatchError`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Success,
    /// A non-throttling error (4xx/5xx other than rate limiting, malformed
    /// response, etc.) — stored as a negative cache entry, no cool-down.
    Error,
    /// The provider itself rate-limited or throttled this call — stored as a
    /// negative cache entry and engages the coordinator's cool-down (spec
    /// §4.5 scenario 5).
    Throttled,
}

/// Successful-dispatch result (spec §6: `{payload, upstream_status,
/// upstream_latency_ms}`).
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub payload: Vec<u8>,
    pub status: UpstreamStatus,
    pub upstream_latency_ms: u64,
}

/// Failure to reach the adapter at all (connection refused, adapter panic
/// caught upstream, etc.) — distinct from a well-formed provider error
/// response, which is carried as `UpstreamResponse { status: Error, .. }`
/// instead of this variant.
#[derive(Debug, Clone)]
pub struct UpstreamDispatchError(pub String);

impl fmt::Display for UpstreamDispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream dispatch failed: {}", self.0)
    }
}

impl std::error::Error for UpstreamDispatchError {}

/// One implementation per provider (spec §6). Must be idempotent with
/// respect to retries for safe operations and must surface provider 429s as
/// [`UpstreamStatus::Throttled`], distinctly from other errors, so the
/// coordinator's cool-down only engages on genuine throttling.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync + 'static {
    async fn dispatch(
        &self,
        provider: Provider,
        operation: &Operation,
        normalized_params: &str,
    ) -> Result<UpstreamResponse, UpstreamDispatchError>;
}
