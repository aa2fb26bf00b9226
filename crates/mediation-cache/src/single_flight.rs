//! Single-flight deduplication (spec §4.4's `singleFlight`), composed from
//! two layers:
//!
//! 1. An in-process leader/waiter broadcast group, grounded directly on
//!    `tower_resilience_coalesce::service::InFlight` — one
//!    `tokio::sync::broadcast` channel per fingerprint, capacity 1.
//! 2. A distributed lease (`KvStore::acquire_lease`/`release_lease`) that
//!    only the local *leader* contends for, so one process with many
//!    concurrent callers for the same fingerprint makes one KV round trip,
//!    not N.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use mediation_core::{EventListeners, Fingerprint, KvStore};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::cache::ResponseCache;
use crate::error::CacheError;
use crate::events::CacheEvent;

/// `None` means the leader's attempt did not produce a usable cached value
/// (build error or store error) — waiters treat that identically, falling
/// back to their own build attempt rather than observing the leader's exact
/// error, since a failed build for one caller isn't necessarily a failure
/// for another (e.g. a transient store timeout).
struct LocalInFlight {
    requests: Mutex<HashMap<String, broadcast::Sender<Option<Vec<u8>>>>>,
}

impl LocalInFlight {
    fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `None` if we are the local leader, `Some(receiver)` if another
    /// in-process caller is already building this fingerprint.
    fn try_join(&self, key: &str) -> Option<broadcast::Receiver<Option<Vec<u8>>>> {
        let mut requests = self.requests.lock();
        if let Some(sender) = requests.get(key) {
            Some(sender.subscribe())
        } else {
            let (tx, _rx) = broadcast::channel(1);
            requests.insert(key.to_string(), tx);
            None
        }
    }

    fn complete(&self, key: &str, result: Option<Vec<u8>>) {
        let mut requests = self.requests.lock();
        if let Some(sender) = requests.remove(key) {
            let _ = sender.send(result);
        }
    }
}

pub struct SingleFlight<S: KvStore, E: Clone + Send + Sync + 'static> {
    store: Arc<S>,
    cache: ResponseCache<S>,
    in_flight: Arc<LocalInFlight>,
    event_listeners: EventListeners<CacheEvent>,
    holder_seq: AtomicU64,
    lease_ttl: Duration,
    poll_interval: Duration,
    poll_slack: Duration,
}

impl<S: KvStore, E: Clone + Send + Sync + 'static> SingleFlight<S, E> {
    pub fn new(store: Arc<S>, lease_ttl: Duration) -> Self {
        Self {
            cache: ResponseCache::new(Arc::clone(&store)),
            store,
            in_flight: Arc::new(LocalInFlight::new()),
            event_listeners: EventListeners::new(),
            holder_seq: AtomicU64::new(0),
            lease_ttl,
            poll_interval: Duration::from_millis(25),
            poll_slack: Duration::from_millis(100),
        }
    }

    pub fn with_event_listeners(mut self, event_listeners: EventListeners<CacheEvent>) -> Self {
        self.event_listeners = event_listeners;
        self
    }

    fn holder_id(&self) -> String {
        format!("sf-{:p}-{}", Arc::as_ptr(&self.store), self.holder_seq.fetch_add(1, Ordering::Relaxed))
    }

    /// `scope` identifies the user-scoped cache namespace (see
    /// [`ResponseCache::key`]); `build` runs only for the process (and within
    /// it, only the first local caller) that wins the distributed lease.
    pub async fn get_or_build<F, Fut>(
        &self,
        scope: &str,
        fingerprint: &Fingerprint,
        ttl: Duration,
        negative_ttl: Duration,
        build: F,
    ) -> Result<Vec<u8>, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>, E>>,
    {
        let start = Instant::now();
        let lookup = self.cache.lookup(scope, fingerprint).await?;
        if lookup.hit {
            self.event_listeners.emit(&CacheEvent::Hit {
                fingerprint: fingerprint.to_string(),
                timestamp: start,
                is_negative: lookup.is_negative,
            });
            return Ok(lookup.value.unwrap_or_default());
        }
        self.event_listeners.emit(&CacheEvent::Miss {
            fingerprint: fingerprint.to_string(),
            timestamp: start,
        });

        let dedup_key = format!("{scope}:{fingerprint}");
        match self.in_flight.try_join(&dedup_key) {
            None => {
                self.event_listeners.emit(&CacheEvent::SingleFlightLeader {
                    fingerprint: fingerprint.to_string(),
                    timestamp: start,
                });
                let result = self.lead(scope, fingerprint, ttl, negative_ttl, build).await;
                self.in_flight.complete(&dedup_key, result.as_ref().ok().cloned());
                result
            }
            Some(mut rx) => {
                self.event_listeners.emit(&CacheEvent::SingleFlightWaiter {
                    fingerprint: fingerprint.to_string(),
                    timestamp: start,
                });
                match tokio::time::timeout(self.lease_ttl + self.poll_slack, rx.recv()).await {
                    Ok(Ok(Some(value))) => Ok(value),
                    _ => {
                        self.event_listeners.emit(&CacheEvent::SingleFlightRaced {
                            fingerprint: fingerprint.to_string(),
                            timestamp: start,
                        });
                        // Leader vanished or lease outlived our wait budget;
                        // proceed to build directly (spec §4.4 default policy).
                        self.lead(scope, fingerprint, ttl, negative_ttl, build).await
                    }
                }
            }
        }
    }

    async fn lead<F, Fut>(
        &self,
        scope: &str,
        fingerprint: &Fingerprint,
        ttl: Duration,
        negative_ttl: Duration,
        build: F,
    ) -> Result<Vec<u8>, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>, E>>,
    {
        let holder = self.holder_id();
        let lease_key = format!("lease:{scope}:{fingerprint}");
        let acquired = self.store.acquire_lease(&lease_key, &holder, self.lease_ttl).await?;

        if !acquired {
            if let Some(value) = self.poll_for_peer_result(scope, fingerprint).await? {
                return Ok(value);
            }
            // Lease holder never finished within our wait budget; race
            // admissible per spec §4.4 step 4(a).
        }

        let build_result = build().await;
        match build_result {
            Ok(value) => {
                self.cache.store(scope, fingerprint, &value, ttl, false).await?;
                if acquired {
                    self.store.release_lease(&lease_key, &holder).await?;
                }
                Ok(value)
            }
            Err(e) => {
                self.cache.store(scope, fingerprint, &[], negative_ttl, true).await?;
                if acquired {
                    self.store.release_lease(&lease_key, &holder).await?;
                }
                Err(CacheError::Build(e))
            }
        }
    }

    async fn poll_for_peer_result(&self, scope: &str, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>, CacheError<E>> {
        let deadline = Instant::now() + self.lease_ttl + self.poll_slack;
        while Instant::now() < deadline {
            let lookup = self.cache.lookup(scope, fingerprint).await?;
            if lookup.hit {
                return Ok(Some(lookup.value.unwrap_or_default()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(None)
    }
}
