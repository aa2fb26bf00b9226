//! The prefetch lease (spec §4.7 step 1, spec §6 key layout
//! `lock:pf:{fingerprint}`) — distinct from `mediation_cache`'s single-flight
//! lease (`lock:sf:{fingerprint}`) so a prefetch sweep and a user-facing
//! cache-miss build never contend on the same key: spec §4.7's closing note
//! is that "coexistence with an in-flight singleFlight is safe because the
//! second caller observes the fresh cache entry", which only holds if the
//! two leases are namespaced apart.

use std::sync::Arc;
use std::time::Duration;

use mediation_core::{Fingerprint, KvStore, StoreError};

pub struct PrefetchLease<S: KvStore> {
    store: Arc<S>,
    ttl: Duration,
}

impl<S: KvStore> PrefetchLease<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("lock:pf:{fingerprint}")
    }

    /// Attempts to acquire the prefetch lease for this fingerprint. Returns
    /// `Ok(None)` (not an error) when another holder already has it.
    pub async fn try_acquire(&self, fingerprint: &Fingerprint, holder: &str) -> Result<Option<Held<'_, S>>, StoreError> {
        let key = Self::key(fingerprint);
        if self.store.acquire_lease(&key, holder, self.ttl).await? {
            Ok(Some(Held { store: &self.store, key, holder: holder.to_string() }))
        } else {
            Ok(None)
        }
    }
}

/// A held prefetch lease; release it explicitly with [`Held::release`] once
/// the warm attempt completes. Not `Drop`-released because release is a
/// fallible async operation and a best-effort leak-on-expiry is acceptable
/// (the lease's TTL bounds the blast radius either way).
pub struct Held<'a, S: KvStore> {
    store: &'a Arc<S>,
    key: String,
    holder: String,
}

impl<'a, S: KvStore> Held<'a, S> {
    pub async fn release(self) -> Result<(), StoreError> {
        self.store.release_lease(&self.key, &self.holder).await
    }
}
