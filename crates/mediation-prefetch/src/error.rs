//! Error taxonomy for the prefetch orchestrator. Mirrors the leaf-error-enum
//! idiom (`thiserror`) used by `CoordinatorError`/`QueueError`, but since
//! prefetch failures are always swallowed and logged (spec §4.7 step 3: "on
//! `Queue`/`Reject` drop silently") nothing downstream matches on these
//! variants — they exist for `tracing::warn!`'s benefit and for tests.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("coordinator error: {0}")]
    Coordinator(#[from] mediation_coordinator::CoordinatorError),
    #[error("store error: {0}")]
    Store(#[from] mediation_core::StoreError),
    #[error("upstream dispatch failed: {0}")]
    Dispatch(#[from] mediation_core::UpstreamDispatchError),
}
