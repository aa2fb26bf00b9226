//! The per-day quota ledger (spec §4.3, component C3).
//!
//! Charges are encoded as a single [`KvStore::increment_by`] call so a
//! `RedisStore` backend executes the read-check-write as one Lua script —
//! the same composed-atomicity idiom `mediation-ratelimit` uses for admits,
//! here applied to a day-bucketed counter instead of a sliding log.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mediation_core::{EventListeners, KvStore, Operation, Provider, UserId};
use time::OffsetDateTime;

use crate::error::QuotaError;
use crate::events::QuotaEvent;

/// Outcome of [`QuotaLedger::charge`], matching spec §4.3 exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeOutcome {
    pub charged: bool,
    pub current: u32,
    pub cap: u32,
    pub reset_epoch: i64,
}

fn day_bucket(now: OffsetDateTime) -> String {
    format!("{:04}{:02}{:02}", now.year(), now.month() as u8, now.day())
}

fn next_utc_midnight(now: OffsetDateTime) -> OffsetDateTime {
    let today = now.date();
    let tomorrow = today.next_day().unwrap_or(today);
    tomorrow.midnight().assume_utc()
}

pub struct QuotaLedger<S: KvStore> {
    store: Arc<S>,
    event_listeners: EventListeners<QuotaEvent>,
}

impl<S: KvStore> QuotaLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            event_listeners: EventListeners::new(),
        }
    }

    pub fn with_event_listeners(store: Arc<S>, event_listeners: EventListeners<QuotaEvent>) -> Self {
        Self { store, event_listeners }
    }

    fn key(&self, provider: Provider, user: &UserId, bucket: &str) -> String {
        format!("quota:{provider}:{user}:{bucket}")
    }

    /// Unix timestamp of the next UTC day boundary, i.e. when the current
    /// day-bucket's usage resets to zero.
    pub fn reset_epoch(&self) -> i64 {
        next_utc_midnight(OffsetDateTime::now_utc()).unix_timestamp()
    }

    /// Charges `cost` against the user's per-day budget for `provider`.
    /// `cap` must already be resolved by the caller from tier limits; `None`
    /// means the `(provider, operation)` pair has no configured cost/cap and
    /// is a hard error (spec §4.3 invariant), never treated as unlimited.
    pub async fn charge(
        &self,
        provider: Provider,
        user: &UserId,
        operation: &Operation,
        cost: u32,
        cap: Option<u32>,
    ) -> Result<ChargeOutcome, QuotaError> {
        let start = Instant::now();

        if cost == 0 {
            return Err(QuotaError::InvalidCost);
        }

        let cap = cap.ok_or_else(|| QuotaError::UnknownOperation {
            provider,
            operation: operation.to_string(),
        })?;

        let now = OffsetDateTime::now_utc();
        let bucket = day_bucket(now);
        let key = self.key(provider, user, &bucket);
        let reset_at = next_utc_midnight(now);
        let ttl = Duration::from_secs((reset_at - now).whole_seconds().max(1) as u64);

        let outcome = self
            .store
            .increment_by(&key, cost as i64, cap as i64, ttl)
            .await?;

        let current = outcome.new_value.max(0) as u32;
        let reset_epoch = reset_at.unix_timestamp();

        if outcome.applied {
            self.event_listeners.emit(&QuotaEvent::Charged {
                provider,
                user: user.to_string(),
                timestamp: start,
                cost,
                current,
                cap,
            });
            #[cfg(feature = "metrics")]
            metrics::gauge!("mediation_quota_used", "provider" => provider.as_str()).set(current as f64);
        } else {
            self.event_listeners.emit(&QuotaEvent::Denied {
                provider,
                user: user.to_string(),
                timestamp: start,
                current,
                cap,
            });
            #[cfg(feature = "metrics")]
            metrics::counter!("mediation_quota_denied_total", "provider" => provider.as_str()).increment(1);
        }

        Ok(ChargeOutcome {
            charged: outcome.applied,
            current,
            cap,
            reset_epoch,
        })
    }

    /// Reads the current day-bucket usage without charging anything; used by
    /// the coordinator (C5) to decide which denial reason to surface when a
    /// request would be denied by both the rate limiter and the quota ledger.
    pub async fn current_usage(&self, provider: Provider, user: &UserId) -> Result<u32, QuotaError> {
        let now = OffsetDateTime::now_utc();
        let bucket = day_bucket(now);
        let key = self.key(provider, user, &bucket);
        let raw = self.store.get(&key).await?;
        Ok(raw
            .and_then(|bytes| std::str::from_utf8(&bytes).ok().and_then(|s| s.parse::<i64>().ok()))
            .unwrap_or(0)
            .max(0) as u32)
    }

    /// Best-effort decrement issued by the coordinator (C5) when a request
    /// was admitted but never dispatched upstream. Never refunds
    /// automatically on upstream failure — only on aborted-before-dispatch,
    /// per spec §4.3's stated invariant. May leave a small overcount if the
    /// store is unavailable at compensation time; that is an accepted
    /// trade-off, not a bug to chase.
    pub async fn compensate(&self, provider: Provider, user: &UserId, cost: u32) -> Result<(), QuotaError> {
        let now = OffsetDateTime::now_utc();
        let bucket = day_bucket(now);
        let key = self.key(provider, user, &bucket);
        let reset_at = next_utc_midnight(now);
        let ttl = Duration::from_secs((reset_at - now).whole_seconds().max(1) as u64);

        self.store.increment_by(&key, -(cost as i64), i64::MAX, ttl).await?;

        self.event_listeners.emit(&QuotaEvent::Compensated {
            provider,
            user: user.to_string(),
            timestamp: Instant::now(),
            cost,
        });
        Ok(())
    }
}
