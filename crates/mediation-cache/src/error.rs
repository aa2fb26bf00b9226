#[derive(Debug, Clone, PartialEq)]
pub enum CacheError<E> {
    StoreUnavailable(String),
    /// `buildFn` returned an application error while holding the single-flight
    /// lease.
    Build(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CacheError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
            CacheError::Build(e) => write!(f, "build failed: {e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CacheError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Build(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<mediation_core::StoreError> for CacheError<E> {
    fn from(e: mediation_core::StoreError) -> Self {
        CacheError::StoreUnavailable(e.to_string())
    }
}
