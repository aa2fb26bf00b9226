//! The KV Store Adapter (C1): a thin wrapper over a shared key-value store
//! providing atomic ops, sorted sets, TTL, and pub/sub (spec §4.1).
//!
//! All operations are individually atomic; multi-key atomicity is never
//! assumed. Components that need composed atomicity (the sliding-window
//! counter, the quota ledger) encode it as a single call into the store so a
//! `RedisStore` backend can execute it as one Lua script, the way
//! `tower_resilience_cache::store::CacheStore` keeps its TTL-and-eviction
//! bookkeeping behind a single lock rather than exposing it piecemeal.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;

use crate::error::StoreError;

/// Outcome of a single atomic increment-with-cap operation, used by the
/// quota ledger (C3) to charge a cost without a separate read-then-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    pub applied: bool,
    pub new_value: i64,
}

/// Abstracts a shared key-value store. See spec §4.1 for the full contract.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Deletes `key` only if its current value equals `expected`. Returns
    /// `true` if deleted, `false` if the value did not match (no-op, not an
    /// error) and `Err(Conflict)` is never returned here — callers that need
    /// CAS-style racing should use [`increment_by`](Self::increment_by) or a
    /// lease instead; `compare_and_delete` guards idempotent teardown paths.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// Atomically increments `key` by `amount`, failing (without applying the
    /// increment) if the result would exceed `cap`. This is the single
    /// composed-atomicity primitive the quota ledger (C3) needs.
    async fn increment_by(&self, key: &str, amount: i64, cap: i64, ttl: Duration) -> Result<IncrementOutcome, StoreError>;

    async fn add_to_sorted_set(&self, key: &str, member: &str, score: i64, ttl: Duration) -> Result<(), StoreError>;

    async fn count_in_sorted_set_range(&self, key: &str, min_score: i64, max_score: i64) -> Result<usize, StoreError>;

    async fn trim_sorted_set_below(&self, key: &str, min_score: i64) -> Result<(), StoreError>;

    /// Returns the smallest score currently in the sorted set, if any.
    async fn min_score(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Attempts to acquire an exclusive, time-bounded lease on `key`. Returns
    /// `true` if acquired (or already held by `holder`), `false` if another
    /// holder has it.
    async fn acquire_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Releases a lease, a no-op if not held by `holder`.
    async fn release_lease(&self, key: &str, holder: &str) -> Result<(), StoreError>;

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), StoreError>;

    /// Subscribes to a channel, returning a receiver. Implementations are
    /// free to drop messages sent before subscription completes (at-most-once
    /// delivery is acceptable: spec's Non-goals exclude durable queueing).
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Vec<u8>>, StoreError>;
}

struct ScalarEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

struct SortedSetEntry {
    members: Vec<(String, i64)>,
    expires_at: Option<Instant>,
}

struct LeaseEntry {
    holder: String,
    expires_at: Instant,
}

/// In-memory `KvStore` used for tests, local development, and as the default
/// backend. Grounded on `tower_resilience_cache::store::CacheStore`'s
/// lazy-expiry-on-read approach, generalized from a single typed cache to the
/// full operation set spec §4.1 requires.
pub struct InMemoryStore {
    scalars: RwLock<HashMap<String, ScalarEntry>>,
    sorted_sets: RwLock<HashMap<String, SortedSetEntry>>,
    leases: RwLock<HashMap<String, LeaseEntry>>,
    channels: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scalars: RwLock::new(HashMap::new()),
            sorted_sets: RwLock::new(HashMap::new()),
            leases: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        })
    }

    fn expiry(ttl: Duration) -> Option<Instant> {
        Some(Instant::now() + ttl)
    }

    fn is_expired(expires_at: Option<Instant>) -> bool {
        matches!(expires_at, Some(at) if Instant::now() >= at)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            scalars: RwLock::new(HashMap::new()),
            sorted_sets: RwLock::new(HashMap::new()),
            leases: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut scalars = self.scalars.write().await;
        match scalars.get(key) {
            Some(entry) if Self::is_expired(entry.expires_at) => {
                scalars.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut scalars = self.scalars.write().await;
        scalars.insert(
            key.to_string(),
            ScalarEntry {
                value,
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let mut scalars = self.scalars.write().await;
        match scalars.get(key) {
            Some(entry) if entry.value == expected => {
                scalars.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_by(&self, key: &str, amount: i64, cap: i64, ttl: Duration) -> Result<IncrementOutcome, StoreError> {
        let mut scalars = self.scalars.write().await;
        let current = match scalars.get(key) {
            Some(entry) if !Self::is_expired(entry.expires_at) => {
                std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(0)
            }
            _ => 0,
        };

        let candidate = current + amount;
        if candidate > cap {
            return Ok(IncrementOutcome {
                applied: false,
                new_value: current,
            });
        }

        let keep_ttl = scalars
            .get(key)
            .filter(|e| !Self::is_expired(e.expires_at))
            .and_then(|e| e.expires_at);

        scalars.insert(
            key.to_string(),
            ScalarEntry {
                value: candidate.to_string().into_bytes(),
                expires_at: keep_ttl.or_else(|| Self::expiry(ttl)),
            },
        );
        Ok(IncrementOutcome {
            applied: true,
            new_value: candidate,
        })
    }

    async fn add_to_sorted_set(&self, key: &str, member: &str, score: i64, ttl: Duration) -> Result<(), StoreError> {
        let mut sets = self.sorted_sets.write().await;
        let entry = sets.entry(key.to_string()).or_insert_with(|| SortedSetEntry {
            members: Vec::new(),
            expires_at: None,
        });
        entry.members.push((member.to_string(), score));
        entry.expires_at = Self::expiry(ttl);
        Ok(())
    }

    async fn count_in_sorted_set_range(&self, key: &str, min_score: i64, max_score: i64) -> Result<usize, StoreError> {
        let sets = self.sorted_sets.read().await;
        Ok(sets
            .get(key)
            .filter(|e| !Self::is_expired(e.expires_at))
            .map(|e| e.members.iter().filter(|(_, s)| *s > min_score && *s <= max_score).count())
            .unwrap_or(0))
    }

    async fn trim_sorted_set_below(&self, key: &str, min_score: i64) -> Result<(), StoreError> {
        let mut sets = self.sorted_sets.write().await;
        if let Some(entry) = sets.get_mut(key) {
            entry.members.retain(|(_, s)| *s >= min_score);
        }
        Ok(())
    }

    async fn min_score(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let sets = self.sorted_sets.read().await;
        Ok(sets
            .get(key)
            .filter(|e| !Self::is_expired(e.expires_at))
            .and_then(|e| e.members.iter().map(|(_, s)| *s).min()))
    }

    async fn acquire_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut leases = self.leases.write().await;
        let now = Instant::now();
        match leases.get(key) {
            Some(existing) if existing.holder == holder || existing.expires_at <= now => {
                leases.insert(
                    key.to_string(),
                    LeaseEntry {
                        holder: holder.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                leases.insert(
                    key.to_string(),
                    LeaseEntry {
                        holder: holder.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn release_lease(&self, key: &str, holder: &str) -> Result<(), StoreError> {
        let mut leases = self.leases.write().await;
        if let Some(existing) = leases.get(key) {
            if existing.holder == holder {
                leases.remove(key);
            }
        }
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let scalars = self.scalars.read().await;
        Ok(scalars
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(channel) {
            let _ = sender.send(payload);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Vec<u8>>, StoreError> {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(256).0);
        Ok(sender.subscribe())
    }
}
