use std::time::Duration;

/// Error returned when a request is denied admission by the sliding-window
/// counter.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitError {
    /// No permit was available within the configured wait budget.
    Denied { retry_after: Duration },
    /// The backing `KvStore` could not complete the admit operation.
    StoreUnavailable(String),
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitError::Denied { retry_after } => {
                write!(f, "rate limit denied, retry after {:?}", retry_after)
            }
            RateLimitError::StoreUnavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for RateLimitError {}

impl From<mediation_core::StoreError> for RateLimitError {
    fn from(e: mediation_core::StoreError) -> Self {
        RateLimitError::StoreUnavailable(e.to_string())
    }
}
