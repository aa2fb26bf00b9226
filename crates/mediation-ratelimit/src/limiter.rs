//! Distributed sliding-window admission, generalized from
//! `tower_resilience_ratelimiter::limiter`'s three process-local state
//! machines into `KvStore`-backed strategies keyed by `(Provider, UserId)` so
//! state is shared across worker processes (spec §5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mediation_core::{KvStore, Provider, UserId};

use crate::config::{RateLimiterConfig, WindowType};
use crate::error::RateLimitError;
use crate::events::RateLimitEvent;

/// Outcome of [`SlidingWindowLimiter::admit`], matching spec §4.2 exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitOutcome {
    pub allowed: bool,
    pub retry_after: Duration,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// Distributed sliding-window counter. One instance is typically shared
/// (behind an `Arc`) across all requests for a given provider, or configured
/// generically and parameterized per call by `(provider, user)`.
pub struct SlidingWindowLimiter<S: KvStore> {
    store: Arc<S>,
    config: Arc<RateLimiterConfig>,
    sequence: AtomicU64,
}

impl<S: KvStore> SlidingWindowLimiter<S> {
    pub fn new(store: Arc<S>, config: Arc<RateLimiterConfig>) -> Self {
        Self {
            store,
            config,
            sequence: AtomicU64::new(0),
        }
    }

    fn key(&self, provider: Provider, user: &UserId) -> String {
        format!("ratelimit:{}:{}:{}", self.config.name, provider, user)
    }

    pub async fn admit(&self, provider: Provider, user: &UserId) -> Result<AdmitOutcome, RateLimitError> {
        let start = Instant::now();
        let outcome = match self.config.window_type {
            WindowType::SlidingLog => self.admit_sliding_log(provider, user).await?,
            WindowType::Fixed => self.admit_fixed(provider, user).await?,
            WindowType::SlidingCounter => self.admit_sliding_counter(provider, user).await?,
        };

        if outcome.allowed {
            let event = RateLimitEvent::Admitted {
                provider,
                user: user.to_string(),
                timestamp: start,
                wait_duration: Duration::ZERO,
            };
            self.config.event_listeners.emit(&event);
            #[cfg(feature = "metrics")]
            metrics::counter!("mediation_ratelimit_admitted_total", "provider" => provider.as_str()).increment(1);
        } else {
            let event = RateLimitEvent::Denied {
                provider,
                user: user.to_string(),
                timestamp: start,
                retry_after: outcome.retry_after,
            };
            self.config.event_listeners.emit(&event);
            #[cfg(feature = "metrics")]
            metrics::counter!("mediation_ratelimit_denied_total", "provider" => provider.as_str()).increment(1);
        }

        Ok(outcome)
    }

    /// Exact sliding window: trim entries outside `(now-W, now]`, count, admit
    /// if under `limit_for_period`, entry TTL `2*W` so abandoned keys self-clean
    /// (spec §4.2 step 3).
    async fn admit_sliding_log(&self, provider: Provider, user: &UserId) -> Result<AdmitOutcome, RateLimitError> {
        let key = self.key(provider, user);
        let window_ms = self.config.window.as_millis() as i64;
        let now = now_ms();
        let floor = now - window_ms;

        // Window is the half-open interval (now-W, now]: an admit landing
        // exactly on the trailing edge `now-W` is excluded, so both the trim
        // floor and the count's lower bound sit one past it.
        self.store.trim_sorted_set_below(&key, floor + 1).await?;
        let count = self.store.count_in_sorted_set_range(&key, floor, now).await?;

        if count < self.config.limit_for_period {
            let member = format!("{now}-{}", self.sequence.fetch_add(1, Ordering::Relaxed));
            self.store
                .add_to_sorted_set(&key, &member, now, Duration::from_millis((window_ms * 2) as u64))
                .await?;
            return Ok(AdmitOutcome {
                allowed: true,
                retry_after: Duration::ZERO,
            });
        }

        let retry_after = match self.store.min_score(&key).await? {
            Some(oldest) => {
                let expires_at = oldest + window_ms;
                Duration::from_millis(expires_at.saturating_sub(now).max(0) as u64)
            }
            None => Duration::ZERO,
        };

        Ok(AdmitOutcome {
            allowed: false,
            retry_after,
        })
    }

    /// Resets the whole permit budget at fixed interval boundaries, encoded as
    /// one counter key per period index so the reset is implicit in the key
    /// name rather than a background sweep.
    async fn admit_fixed(&self, provider: Provider, user: &UserId) -> Result<AdmitOutcome, RateLimitError> {
        let window_ms = self.config.window.as_millis() as i64;
        let now = now_ms();
        let period_index = now / window_ms;
        let period_start = period_index * window_ms;
        let key = format!("{}:fixed:{}", self.key(provider, user), period_index);

        let outcome = self
            .store
            .increment_by(
                &key,
                1,
                self.config.limit_for_period as i64,
                Duration::from_millis((window_ms * 2) as u64),
            )
            .await?;

        if outcome.applied {
            return Ok(AdmitOutcome {
                allowed: true,
                retry_after: Duration::ZERO,
            });
        }

        let retry_after = Duration::from_millis((period_start + window_ms - now).max(0) as u64);
        Ok(AdmitOutcome {
            allowed: false,
            retry_after,
        })
    }

    /// Weighted average between the current and previous fixed buckets;
    /// approximate sliding window with O(1) memory per key.
    async fn admit_sliding_counter(&self, provider: Provider, user: &UserId) -> Result<AdmitOutcome, RateLimitError> {
        let bucket_ms = self.config.window.as_millis() as i64;
        let now = now_ms();
        let bucket_index = now / bucket_ms;
        let bucket_start = bucket_index * bucket_ms;
        let elapsed_ratio = ((now - bucket_start) as f64 / bucket_ms as f64).clamp(0.0, 1.0);

        let base = self.key(provider, user);
        let current_key = format!("{base}:bucket:{bucket_index}");
        let previous_key = format!("{base}:bucket:{}", bucket_index - 1);

        let current_count = self.read_count(&current_key).await?;
        let previous_count = self.read_count(&previous_key).await?;

        let weighted = previous_count as f64 * (1.0 - elapsed_ratio) + current_count as f64;

        if weighted < self.config.limit_for_period as f64 {
            self.store
                .increment_by(&current_key, 1, i64::MAX, Duration::from_millis((bucket_ms * 2) as u64))
                .await?;
            return Ok(AdmitOutcome {
                allowed: true,
                retry_after: Duration::ZERO,
            });
        }

        let retry_after = Duration::from_millis((bucket_start + bucket_ms - now).max(0) as u64);
        Ok(AdmitOutcome {
            allowed: false,
            retry_after,
        })
    }

    async fn read_count(&self, key: &str) -> Result<i64, RateLimitError> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0)),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediation_core::InMemoryStore;

    fn config(window_type: WindowType, limit: usize, window: Duration) -> Arc<RateLimiterConfig> {
        Arc::new(
            RateLimiterConfig::builder()
                .window_type(window_type)
                .limit_for_period(limit)
                .window(window)
                .build(),
        )
    }

    #[tokio::test]
    async fn sliding_log_allows_up_to_limit_then_denies() {
        let store = InMemoryStore::new();
        let limiter = SlidingWindowLimiter::new(store, config(WindowType::SlidingLog, 3, Duration::from_secs(10)));
        let user = UserId::from("u1");

        for _ in 0..3 {
            let outcome = limiter.admit(Provider::Video, &user).await.unwrap();
            assert!(outcome.allowed);
        }

        let outcome = limiter.admit(Provider::Video, &user).await.unwrap();
        assert!(!outcome.allowed);
        assert!(outcome.retry_after > Duration::ZERO);
    }

    #[tokio::test]
    async fn sliding_log_is_keyed_per_user_and_provider() {
        let store = InMemoryStore::new();
        let limiter = SlidingWindowLimiter::new(store, config(WindowType::SlidingLog, 1, Duration::from_secs(10)));

        assert!(limiter.admit(Provider::Video, &UserId::from("u1")).await.unwrap().allowed);
        assert!(limiter.admit(Provider::Video, &UserId::from("u2")).await.unwrap().allowed);
        assert!(limiter.admit(Provider::Music, &UserId::from("u1")).await.unwrap().allowed);
        assert!(!limiter.admit(Provider::Video, &UserId::from("u1")).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn sliding_log_admits_again_after_window_elapses() {
        let store = InMemoryStore::new();
        let limiter = SlidingWindowLimiter::new(store, config(WindowType::SlidingLog, 1, Duration::from_millis(30)));
        let user = UserId::from("u1");

        assert!(limiter.admit(Provider::Video, &user).await.unwrap().allowed);
        assert!(!limiter.admit(Provider::Video, &user).await.unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.admit(Provider::Video, &user).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn sliding_log_excludes_entry_exactly_at_window_floor() {
        let store = InMemoryStore::new();
        let key = "ratelimit:<unnamed>:video:u1";
        let window = Duration::from_secs(10);
        let limiter = SlidingWindowLimiter::new(Arc::clone(&store), config(WindowType::SlidingLog, 1, window));
        let user = UserId::from("u1");

        // Plant an entry exactly on the trailing edge of the window (now -
        // W): spec §8 requires this be excluded from the count, so the
        // limiter must still have headroom to admit.
        let floor = now_ms() - window.as_millis() as i64;
        store.add_to_sorted_set(key, "boundary", floor, Duration::from_secs(60)).await.unwrap();

        let outcome = limiter.admit(Provider::Video, &user).await.unwrap();
        assert!(outcome.allowed, "an entry exactly at now-W must not count against the limit");
    }

    #[tokio::test]
    async fn fixed_window_resets_at_period_boundary() {
        let store = InMemoryStore::new();
        let limiter = SlidingWindowLimiter::new(store, config(WindowType::Fixed, 1, Duration::from_millis(30)));
        let user = UserId::from("u1");

        assert!(limiter.admit(Provider::Video, &user).await.unwrap().allowed);
        assert!(!limiter.admit(Provider::Video, &user).await.unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.admit(Provider::Video, &user).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn sliding_counter_eventually_denies_over_limit() {
        let store = InMemoryStore::new();
        let limiter = SlidingWindowLimiter::new(store, config(WindowType::SlidingCounter, 2, Duration::from_secs(10)));
        let user = UserId::from("u1");

        let mut denied = false;
        for _ in 0..5 {
            let outcome = limiter.admit(Provider::Video, &user).await.unwrap();
            if !outcome.allowed {
                denied = true;
            }
        }
        assert!(denied);
    }

    #[tokio::test]
    async fn emits_admitted_and_denied_events() {
        use std::sync::atomic::{AtomicUsize, Ordering as AOrdering};

        let admitted = Arc::new(AtomicUsize::new(0));
        let denied = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&admitted);
        let d = Arc::clone(&denied);

        let config = Arc::new(
            RateLimiterConfig::builder()
                .window_type(WindowType::SlidingLog)
                .limit_for_period(1)
                .window(Duration::from_secs(10))
                .on_admitted(move |_| {
                    a.fetch_add(1, AOrdering::SeqCst);
                })
                .on_denied(move |_| {
                    d.fetch_add(1, AOrdering::SeqCst);
                })
                .build(),
        );

        let store = InMemoryStore::new();
        let limiter = SlidingWindowLimiter::new(store, config);
        let user = UserId::from("u1");

        limiter.admit(Provider::Video, &user).await.unwrap();
        limiter.admit(Provider::Video, &user).await.unwrap();

        assert_eq!(admitted.load(AOrdering::SeqCst), 1);
        assert_eq!(denied.load(AOrdering::SeqCst), 1);
    }
}
