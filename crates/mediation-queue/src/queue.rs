//! Per-user bounded priority queue (spec §4.6, component C6), persisted in
//! the shared store under `queue:{user}:{sequence}` (spec §6) so queue state
//! survives a process restart the same way `mediation-cache`'s entries do —
//! per the system overview's ownership rule, the store owns all mutable
//! state, so unlike a `BinaryHeap` kept in a process-local `Mutex` this
//! queue re-derives its order on every read from whatever the store has.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mediation_core::{EventListeners, KvStore, Priority, Provider, UserId};

use crate::error::QueueError;
use crate::events::QueueEvent;
use crate::request::QueuedRequest;

/// Outcome of [`RequestQueue::enqueue`], matching spec §4.6's
/// `{position, eta}` shape. `eta` is left to the caller (the coordinator),
/// which has visibility into rate-limit headroom; this crate only reports
/// queue position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub position: usize,
}

pub struct RequestQueue<S: KvStore> {
    store: Arc<S>,
    sequence: AtomicU64,
    event_listeners: EventListeners<QueueEvent>,
}

impl<S: KvStore> RequestQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            sequence: AtomicU64::new(0),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn with_event_listeners(mut self, event_listeners: EventListeners<QueueEvent>) -> Self {
        self.event_listeners = event_listeners;
        self
    }

    fn prefix(user: &UserId) -> String {
        format!("queue:{user}:")
    }

    fn key(user: &UserId, sequence: u64) -> String {
        format!("queue:{user}:{sequence:020}")
    }

    /// Lists every request queued for `user`, sorted `(priority desc,
    /// enqueued_at asc)`.
    pub async fn list_user(&self, user: &UserId) -> Result<Vec<QueuedRequest>, QueueError> {
        let keys = self.store.scan_keys(&Self::prefix(user)).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                if let Ok(req) = serde_json::from_slice::<QueuedRequest>(&raw) {
                    out.push(req);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// All users with at least one queued entry, derived by scanning the
    /// `queue:` prefix rather than tracked separately — bounded per-user
    /// depth keeps this cheap (spec §4.6).
    pub async fn active_users(&self) -> Result<Vec<UserId>, QueueError> {
        let keys = self.store.scan_keys("queue:").await?;
        let mut users: Vec<String> = keys
            .iter()
            .filter_map(|k| k.split(':').nth(1).map(str::to_string))
            .collect();
        users.sort();
        users.dedup();
        Ok(users.into_iter().map(UserId).collect())
    }

    pub async fn enqueue(
        &self,
        user: &UserId,
        provider: Provider,
        operation_name: &str,
        normalized_params: &str,
        priority: Priority,
        deadline: Duration,
        max_depth: usize,
    ) -> Result<EnqueueOutcome, QueueError> {
        let existing = self.list_user(user).await?;
        if existing.len() >= max_depth {
            self.event_listeners.emit(&QueueEvent::Full {
                provider,
                user: user.to_string(),
                timestamp: std::time::Instant::now(),
                max_depth,
            });
            #[cfg(feature = "metrics")]
            metrics::counter!("mediation_queue_full_total", "provider" => provider.as_str()).increment(1);
            return Err(QueueError::QueueFull { max_depth });
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let request = QueuedRequest::new(
            user.clone(),
            provider,
            mediation_core::Operation::from(operation_name),
            normalized_params.to_string(),
            priority,
            deadline,
            sequence,
        );

        let encoded = serde_json::to_vec(&request).expect("QueuedRequest is always serializable");
        let store_ttl = deadline + Duration::from_secs(5);
        self.store.set_with_ttl(&Self::key(user, sequence), encoded, store_ttl).await?;

        let position = existing.iter().filter(|r| **r < request).count() + 1;

        self.event_listeners.emit(&QueueEvent::Enqueued {
            provider,
            user: user.to_string(),
            timestamp: std::time::Instant::now(),
            position,
        });
        #[cfg(feature = "metrics")]
        metrics::gauge!("mediation_queue_depth", "provider" => provider.as_str()).set((existing.len() + 1) as f64);

        Ok(EnqueueOutcome { position })
    }

    /// Removes `request` from the store unconditionally; used by the
    /// scheduler on drain (dispatched or expired).
    pub async fn remove(&self, request: &QueuedRequest) -> Result<(), QueueError> {
        let user = request.user_id();
        let key = Self::key(&user, request.sequence);
        if let Some(current) = self.store.get(&key).await? {
            self.store.compare_and_delete(&key, &current).await?;
        }
        Ok(())
    }

    pub fn event_listeners(&self) -> &EventListeners<QueueEvent> {
        &self.event_listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediation_core::InMemoryStore;

    #[tokio::test]
    async fn enqueue_reports_increasing_position_by_priority() {
        let queue = RequestQueue::new(InMemoryStore::new());
        let user = UserId::from("u1");

        let first = queue
            .enqueue(&user, Provider::Video, "details", "", 0, Duration::from_secs(30), 10)
            .await
            .unwrap();
        assert_eq!(first.position, 1);

        let second = queue
            .enqueue(&user, Provider::Video, "details", "", 0, Duration::from_secs(30), 10)
            .await
            .unwrap();
        assert_eq!(second.position, 2);

        // A higher-priority arrival jumps ahead.
        let third = queue
            .enqueue(&user, Provider::Video, "details", "", 5, Duration::from_secs(30), 10)
            .await
            .unwrap();
        assert_eq!(third.position, 1);
    }

    #[tokio::test]
    async fn enqueue_fails_at_max_depth() {
        let queue = RequestQueue::new(InMemoryStore::new());
        let user = UserId::from("u1");

        for _ in 0..2 {
            queue.enqueue(&user, Provider::Video, "details", "", 0, Duration::from_secs(30), 2).await.unwrap();
        }

        let err = queue
            .enqueue(&user, Provider::Video, "details", "", 0, Duration::from_secs(30), 2)
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::QueueFull { max_depth: 2 });
    }

    #[tokio::test]
    async fn list_user_is_ordered_priority_desc_then_fifo() {
        let queue = RequestQueue::new(InMemoryStore::new());
        let user = UserId::from("u1");

        queue.enqueue(&user, Provider::Video, "details", "a", 0, Duration::from_secs(30), 10).await.unwrap();
        queue.enqueue(&user, Provider::Video, "details", "b", 5, Duration::from_secs(30), 10).await.unwrap();
        queue.enqueue(&user, Provider::Video, "details", "c", 0, Duration::from_secs(30), 10).await.unwrap();

        let listed = queue.list_user(&user).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].normalized_params, "b");
        assert_eq!(listed[1].normalized_params, "a");
        assert_eq!(listed[2].normalized_params, "c");
    }

    #[tokio::test]
    async fn remove_deletes_from_store() {
        let queue = RequestQueue::new(InMemoryStore::new());
        let user = UserId::from("u1");
        queue.enqueue(&user, Provider::Video, "details", "", 0, Duration::from_secs(30), 10).await.unwrap();

        let listed = queue.list_user(&user).await.unwrap();
        queue.remove(&listed[0]).await.unwrap();

        assert!(queue.list_user(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queues_are_independent_per_user() {
        let queue = RequestQueue::new(InMemoryStore::new());
        queue.enqueue(&UserId::from("u1"), Provider::Video, "details", "", 0, Duration::from_secs(30), 1).await.unwrap();
        queue.enqueue(&UserId::from("u2"), Provider::Video, "details", "", 0, Duration::from_secs(30), 1).await.unwrap();

        let users = queue.active_users().await.unwrap();
        assert_eq!(users.len(), 2);
    }
}
