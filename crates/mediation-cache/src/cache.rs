//! Content-keyed response cache (spec §4.4, component C4), backed directly by
//! [`KvStore`] — per the system overview, the store owns all mutable state,
//! so unlike `tower_resilience_cache::store::CacheStore` there is no
//! process-local eviction structure here; TTL expiry is delegated entirely
//! to the store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mediation_core::{Fingerprint, KvStore, StoreError};

/// Result of [`ResponseCache::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    pub hit: bool,
    pub value: Option<Vec<u8>>,
    pub is_negative: bool,
    pub age: Duration,
}

impl CacheLookup {
    fn miss() -> Self {
        Self {
            hit: false,
            value: None,
            is_negative: false,
            age: Duration::ZERO,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// Encodes `(is_negative, inserted_at_ms, payload)` into a single value so a
/// single `KvStore::get` round trip recovers everything `lookup` needs.
fn encode(payload: &[u8], is_negative: bool, inserted_at_ms: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + payload.len());
    out.push(is_negative as u8);
    out.extend_from_slice(&inserted_at_ms.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn decode(raw: &[u8]) -> Option<(bool, i64, &[u8])> {
    if raw.len() < 9 {
        return None;
    }
    let is_negative = raw[0] != 0;
    let inserted_at_ms = i64::from_be_bytes(raw[1..9].try_into().ok()?);
    Some((is_negative, inserted_at_ms, &raw[9..]))
}

pub struct ResponseCache<S: KvStore> {
    store: std::sync::Arc<S>,
}

impl<S: KvStore> ResponseCache<S> {
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store }
    }

    /// `scope` is a human-readable, caller-chosen prefix such as
    /// `"video:alice"` or `"chat:alice"` — it is what [`invalidate`] matches
    /// against, since the fingerprint itself is an opaque content hash and
    /// carries no user-scoped structure to prefix-match on.
    fn key(scope: &str, fingerprint: &Fingerprint) -> String {
        format!("cache:{scope}:{fingerprint}")
    }

    pub async fn lookup(&self, scope: &str, fingerprint: &Fingerprint) -> Result<CacheLookup, StoreError> {
        let raw = self.store.get(&Self::key(scope, fingerprint)).await?;
        let Some(raw) = raw else {
            return Ok(CacheLookup::miss());
        };
        let Some((is_negative, inserted_at_ms, payload)) = decode(&raw) else {
            return Ok(CacheLookup::miss());
        };

        let age = Duration::from_millis((now_ms() - inserted_at_ms).max(0) as u64);
        Ok(CacheLookup {
            hit: true,
            value: Some(payload.to_vec()),
            is_negative,
            age,
        })
    }

    pub async fn store(
        &self,
        scope: &str,
        fingerprint: &Fingerprint,
        value: &[u8],
        ttl: Duration,
        is_negative: bool,
    ) -> Result<(), StoreError> {
        let encoded = encode(value, is_negative, now_ms());
        self.store.set_with_ttl(&Self::key(scope, fingerprint), encoded, ttl).await
    }

    /// Deletes every cache entry under a user-scoped prefix (e.g. `"chat:alice"`
    /// to evict all of a user's chat history entries regardless of operation).
    pub async fn invalidate(&self, scope_prefix: &str) -> Result<usize, StoreError> {
        let prefix = format!("cache:{scope_prefix}");
        let keys = self.store.scan_keys(&prefix).await?;
        let mut deleted = 0;
        for key in &keys {
            if let Some(current) = self.store.get(key).await? {
                if self.store.compare_and_delete(key, &current).await? {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediation_core::{InMemoryStore, Operation, Provider};

    fn fp(seed: &str) -> Fingerprint {
        Fingerprint::new(Provider::Video, &Operation::from("recommend"), seed, None, 1)
    }

    #[tokio::test]
    async fn miss_on_empty_cache() {
        let cache = ResponseCache::new(InMemoryStore::new());
        let lookup = cache.lookup("video:alice", &fp("a")).await.unwrap();
        assert!(!lookup.hit);
    }

    #[tokio::test]
    async fn store_then_lookup_hits() {
        let cache = ResponseCache::new(InMemoryStore::new());
        let key = fp("a");
        cache.store("video:alice", &key, b"payload", Duration::from_secs(60), false).await.unwrap();

        let lookup = cache.lookup("video:alice", &key).await.unwrap();
        assert!(lookup.hit);
        assert!(!lookup.is_negative);
        assert_eq!(lookup.value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn negative_entries_are_flagged() {
        let cache = ResponseCache::new(InMemoryStore::new());
        let key = fp("a");
        cache.store("video:alice", &key, b"", Duration::from_secs(5), true).await.unwrap();

        let lookup = cache.lookup("video:alice", &key).await.unwrap();
        assert!(lookup.hit);
        assert!(lookup.is_negative);
    }

    #[tokio::test]
    async fn entries_expire_via_ttl() {
        let cache = ResponseCache::new(InMemoryStore::new());
        let key = fp("a");
        cache.store("video:alice", &key, b"payload", Duration::from_millis(10), false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let lookup = cache.lookup("video:alice", &key).await.unwrap();
        assert!(!lookup.hit);
    }

    #[tokio::test]
    async fn invalidate_deletes_entries_under_scope() {
        let cache = ResponseCache::new(InMemoryStore::new());
        cache.store("chat:alice", &fp("msg-1"), b"a", Duration::from_secs(60), false).await.unwrap();
        cache.store("chat:alice", &fp("msg-2"), b"b", Duration::from_secs(60), false).await.unwrap();
        cache.store("chat:bob", &fp("msg-1"), b"c", Duration::from_secs(60), false).await.unwrap();

        let deleted = cache.invalidate("chat:alice").await.unwrap();
        assert_eq!(deleted, 2);

        assert!(!cache.lookup("chat:alice", &fp("msg-1")).await.unwrap().hit);
        assert!(cache.lookup("chat:bob", &fp("msg-1")).await.unwrap().hit);
    }
}
