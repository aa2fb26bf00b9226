#[derive(Debug, Clone, PartialEq)]
pub enum QueueError {
    /// The per-user queue was already at `max_queue_depth_per_user` (spec §4.6).
    QueueFull { max_depth: usize },
    StoreUnavailable(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::QueueFull { max_depth } => write!(f, "queue full (max depth {max_depth})"),
            QueueError::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<mediation_core::StoreError> for QueueError {
    fn from(e: mediation_core::StoreError) -> Self {
        QueueError::StoreUnavailable(e.to_string())
    }
}
