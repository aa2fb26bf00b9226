//! The admission request/decision types (spec §4.5), matching the "tagged
//! value, not a thrown exception" redesign the spec calls for (§9 REDESIGN
//! FLAGS: "Exception-for-control-flow on rate denial becomes typed
//! `Decision`/`Result` values at all public boundaries").

use std::time::Duration;

use mediation_core::{Cost, Fingerprint, Priority, Provider, Tier, UserId};

/// Input to [`crate::RateLimitCoordinator::admit`] (spec §4.5).
#[derive(Debug, Clone)]
pub struct AdmitRequest {
    pub provider: Provider,
    pub operation: String,
    pub user: UserId,
    pub tier: Tier,
    /// Already-normalized parameter string, used for fingerprinting.
    pub normalized_params: String,
    pub priority: Priority,
    pub allow_queue: bool,
    pub deadline: Duration,
}

/// Why a request was rejected, carrying the retry hints spec §7 requires in
/// the structured error body.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Rate { retry_after: Duration },
    Quota { current_usage: u32, limit: u32, reset_epoch: i64 },
    QueueFull { max_queue_depth: usize },
}

/// A right to dispatch upstream and later report the outcome via
/// [`crate::RateLimitCoordinator::complete`]. Carries everything needed to
/// store the result and (if the request is aborted before dispatch)
/// compensate the quota ledger, without the caller having to re-derive the
/// fingerprint or remember the charged cost.
#[derive(Debug, Clone)]
pub struct UpstreamLease {
    pub provider: Provider,
    pub user: UserId,
    pub scope: String,
    pub fingerprint: Fingerprint,
    pub holder: String,
    pub cost: Cost,
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    /// `true` if this lease holder actually acquired the distributed lock;
    /// `false` means we raced ahead after the prior holder's lease expired
    /// (spec §4.4 step 4(a)) and must not attempt to release a lease we
    /// never held.
    pub(crate) lease_acquired: bool,
}

/// The coordinator's admission decision (spec §4.5).
#[derive(Debug, Clone)]
pub enum Decision {
    /// A fresh, non-negative cache hit; serve this payload directly.
    ServeCached(Vec<u8>),
    /// The caller won the single-flight lease (or raced ahead of an expired
    /// one) and must dispatch upstream, then call
    /// [`crate::RateLimitCoordinator::complete`].
    CallUpstream(UpstreamLease),
    /// Deferred into the per-user queue; spec §4.5/§4.6 `{position, eta}`.
    Queue { position: usize, eta: Duration },
    Reject(RejectReason),
}

/// Outcome of a dispatched (or abandoned) upstream call, reported via
/// [`crate::RateLimitCoordinator::complete`] (spec §4.5).
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Success(Vec<u8>),
    ProviderError,
    ProviderThrottled,
    AbortedBeforeDispatch,
}
