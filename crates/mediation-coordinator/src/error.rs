#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    /// `(provider, operation)` has no configured cost — a hard error (spec
    /// §4.3), never silently treated as free.
    UnknownOperation { operation: String },
    StoreUnavailable(String),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorError::UnknownOperation { operation } => write!(f, "unknown operation '{operation}'"),
            CoordinatorError::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<mediation_core::StoreError> for CoordinatorError {
    fn from(e: mediation_core::StoreError) -> Self {
        CoordinatorError::StoreUnavailable(e.to_string())
    }
}

impl<E: std::fmt::Display> From<mediation_cache::CacheError<E>> for CoordinatorError {
    fn from(e: mediation_cache::CacheError<E>) -> Self {
        CoordinatorError::StoreUnavailable(e.to_string())
    }
}

impl From<mediation_queue::QueueError> for CoordinatorError {
    fn from(e: mediation_queue::QueueError) -> Self {
        CoordinatorError::StoreUnavailable(e.to_string())
    }
}

impl From<mediation_quota::QuotaError> for CoordinatorError {
    fn from(e: mediation_quota::QuotaError) -> Self {
        CoordinatorError::StoreUnavailable(e.to_string())
    }
}

impl From<mediation_ratelimit::RateLimitError> for CoordinatorError {
    fn from(e: mediation_ratelimit::RateLimitError) -> Self {
        CoordinatorError::StoreUnavailable(e.to_string())
    }
}
