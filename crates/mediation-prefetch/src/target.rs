//! Registered prefetch targets (spec §4.7): the `(provider, user, operation,
//! params, tier)` tuples the periodic sweep keeps warm. Persisted under
//! `prefetch:target:{user}:{provider}:{operation}:{params_hash}` (spec §6's
//! persisted-state-layout convention), mirroring
//! `mediation_queue::RequestQueue`'s scan-derived registry rather than a
//! process-local set: a sign-in handled by one process must still be visible
//! to the periodic sweep running on any other process, per the system
//! overview's rule that the store — not any one process — owns all mutable
//! state.

use std::sync::Arc;
use std::time::Duration;

use mediation_core::{KvStore, Operation, Provider, StoreError, Tier, UserId};
use serde::{Deserialize, Serialize};

/// A recommendation fingerprint kept warm by the periodic sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchTarget {
    pub user: String,
    pub provider: Provider,
    pub operation: String,
    pub normalized_params: String,
    pub tier: Tier,
}

impl PrefetchTarget {
    pub fn new(user: UserId, provider: Provider, operation: Operation, normalized_params: String, tier: Tier) -> Self {
        Self {
            user: user.0,
            provider,
            operation: operation.0,
            normalized_params,
            tier,
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId(self.user.clone())
    }

    pub fn operation(&self) -> Operation {
        Operation(self.operation.clone())
    }
}

/// How long a registration survives without being renewed. A sign-in that
/// is never followed by another keeps its target warm for one day, then
/// drops off the sweep on its own — the same self-cleaning-via-TTL idiom
/// `mediation-quota` uses for day buckets, applied here to "active user"
/// instead of "usage count".
const REGISTRATION_TTL: Duration = Duration::from_secs(86_400);

/// Scan-derived registry of active prefetch targets, backed directly by the
/// shared store (no process-local cache).
pub struct TargetRegistry<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> TargetRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(target: &PrefetchTarget) -> String {
        let params_hash = blake3::hash(target.normalized_params.as_bytes()).to_hex();
        format!("prefetch:target:{}:{}:{}:{}", target.user, target.provider, target.operation, params_hash)
    }

    /// Registers (or renews) a target. Idempotent: registering the same
    /// `(user, provider, operation, params)` tuple again just resets the
    /// TTL, which is exactly what a repeat sign-in should do.
    pub async fn register(&self, target: &PrefetchTarget) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(target).expect("PrefetchTarget is always serializable");
        self.store.set_with_ttl(&Self::key(target), encoded, REGISTRATION_TTL).await
    }

    pub async fn unregister(&self, target: &PrefetchTarget) -> Result<(), StoreError> {
        let key = Self::key(target);
        if let Some(current) = self.store.get(&key).await? {
            self.store.compare_and_delete(&key, &current).await?;
        }
        Ok(())
    }

    /// All currently registered targets, across every process sharing this
    /// store.
    pub async fn active_targets(&self) -> Result<Vec<PrefetchTarget>, StoreError> {
        let keys = self.store.scan_keys("prefetch:target:").await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                if let Ok(target) = serde_json::from_slice::<PrefetchTarget>(&raw) {
                    out.push(target);
                }
            }
        }
        Ok(out)
    }
}
