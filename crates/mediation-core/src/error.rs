//! Common error types for the mediation layer.
//!
//! [`MediationError`] unifies the error taxonomy from spec §7 (`CacheMiss`,
//! `RateDenied`, `QuotaDenied`, `QueueFull`, `Timeout`, `UpstreamError`,
//! `UpstreamThrottled`, `StoreUnavailable`, `Conflict`, `ConfigInvalid`,
//! `UnknownOperation`) the same way `tower_resilience_core::ResilienceError<E>`
//! unifies per-layer errors: one enum, an `Application(E)` escape hatch for the
//! caller's own error type, and `is_*()`/`map_application` helpers so callers
//! composing multiple components never write a manual `From` impl.

use std::fmt;
use std::time::Duration;

use crate::domain::Provider;

/// Failure modes of the [`KvStore`](crate::kv::KvStore) abstraction (spec §4.1).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("lost race on compare-and-delete or lease acquisition")]
    Conflict,
    #[error("store operation timed out")]
    Timeout,
}

/// The unified error type for the mediation layer.
///
/// `CacheMiss` and `Conflict` are control signals handled locally by C4/C5 and
/// are deliberately not variants here — they never escape those components.
#[derive(Debug, Clone)]
pub enum MediationError<E> {
    /// Denied by the sliding-window rate limiter.
    RateDenied { retry_after: Duration },
    /// Denied by the per-day quota ledger.
    QuotaDenied {
        current_usage: u32,
        limit: u32,
        reset_epoch: i64,
    },
    /// The per-user request queue was at capacity.
    QueueFull { max_queue_depth: usize },
    /// A deadline elapsed before dispatch.
    Timeout,
    /// The upstream adapter returned a non-throttling error.
    UpstreamError { provider: Provider },
    /// The upstream adapter reported a provider-side 429.
    UpstreamThrottled { provider: Provider },
    /// The KV store backing the mediation layer is unavailable.
    StoreUnavailable(StoreError),
    /// The configuration document failed validation at load time.
    ConfigInvalid(String),
    /// The requested operation is not defined for this provider.
    UnknownOperation { provider: Provider, operation: String },
    /// The underlying application/service returned an error.
    Application(E),
}

impl<E> fmt::Display for MediationError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediationError::RateDenied { retry_after } => {
                write!(f, "rate limited, retry after {:?}", retry_after)
            }
            MediationError::QuotaDenied {
                current_usage,
                limit,
                reset_epoch,
            } => write!(
                f,
                "quota exhausted ({}/{}), resets at {}",
                current_usage, limit, reset_epoch
            ),
            MediationError::QueueFull { max_queue_depth } => {
                write!(f, "queue full (max depth {})", max_queue_depth)
            }
            MediationError::Timeout => write!(f, "deadline exceeded"),
            MediationError::UpstreamError { provider } => {
                write!(f, "upstream error from {}", provider)
            }
            MediationError::UpstreamThrottled { provider } => {
                write!(f, "upstream throttled {}", provider)
            }
            MediationError::StoreUnavailable(e) => write!(f, "store unavailable: {}", e),
            MediationError::ConfigInvalid(msg) => write!(f, "invalid configuration: {}", msg),
            MediationError::UnknownOperation { provider, operation } => {
                write!(f, "unknown operation '{}' for provider {}", operation, provider)
            }
            MediationError::Application(e) => write!(f, "application error: {}", e),
        }
    }
}

impl<E> std::error::Error for MediationError<E> where E: std::error::Error {}

impl<E> From<StoreError> for MediationError<E> {
    fn from(e: StoreError) -> Self {
        MediationError::StoreUnavailable(e)
    }
}

impl<E> MediationError<E> {
    pub fn is_rate_denied(&self) -> bool {
        matches!(self, MediationError::RateDenied { .. })
    }

    pub fn is_quota_denied(&self) -> bool {
        matches!(self, MediationError::QuotaDenied { .. })
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, MediationError::QueueFull { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MediationError::Timeout)
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, MediationError::StoreUnavailable(_))
    }

    pub fn is_application(&self) -> bool {
        matches!(self, MediationError::Application(_))
    }

    pub fn application_error(self) -> Option<E> {
        match self {
            MediationError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the application error using a function, preserving every other
    /// variant untouched.
    pub fn map_application<F, T>(self, f: F) -> MediationError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            MediationError::RateDenied { retry_after } => MediationError::RateDenied { retry_after },
            MediationError::QuotaDenied {
                current_usage,
                limit,
                reset_epoch,
            } => MediationError::QuotaDenied {
                current_usage,
                limit,
                reset_epoch,
            },
            MediationError::QueueFull { max_queue_depth } => {
                MediationError::QueueFull { max_queue_depth }
            }
            MediationError::Timeout => MediationError::Timeout,
            MediationError::UpstreamError { provider } => MediationError::UpstreamError { provider },
            MediationError::UpstreamThrottled { provider } => {
                MediationError::UpstreamThrottled { provider }
            }
            MediationError::StoreUnavailable(e) => MediationError::StoreUnavailable(e),
            MediationError::ConfigInvalid(msg) => MediationError::ConfigInvalid(msg),
            MediationError::UnknownOperation { provider, operation } => {
                MediationError::UnknownOperation { provider, operation }
            }
            MediationError::Application(e) => MediationError::Application(f(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestError;

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    const _: () = {
        const fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<MediationError<TestError>>();
    };

    #[test]
    fn displays_rate_denied() {
        let err: MediationError<TestError> = MediationError::RateDenied {
            retry_after: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn map_application_preserves_other_variants() {
        let err: MediationError<TestError> = MediationError::QueueFull { max_queue_depth: 10 };
        let mapped = err.map_application(|_| 42usize);
        assert!(matches!(mapped, MediationError::QueueFull { max_queue_depth: 10 }));
    }

    #[test]
    fn application_error_roundtrips() {
        let err: MediationError<TestError> = MediationError::Application(TestError);
        assert!(err.is_application());
        assert!(err.application_error().is_some());
    }
}
