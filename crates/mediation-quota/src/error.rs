use mediation_core::Provider;

#[derive(Debug, Clone, PartialEq)]
pub enum QuotaError {
    /// `cost` was zero or negative; charges must be strictly positive.
    InvalidCost,
    /// The caller could not resolve a cap for this `(provider, operation)`
    /// pair — a hard error, never silently treated as unlimited.
    UnknownOperation { provider: Provider, operation: String },
    StoreUnavailable(String),
}

impl std::fmt::Display for QuotaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaError::InvalidCost => write!(f, "charge cost must be positive"),
            QuotaError::UnknownOperation { provider, operation } => {
                write!(f, "unknown operation '{operation}' for provider {provider}")
            }
            QuotaError::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for QuotaError {}

impl From<mediation_core::StoreError> for QuotaError {
    fn from(e: mediation_core::StoreError) -> Self {
        QuotaError::StoreUnavailable(e.to_string())
    }
}
