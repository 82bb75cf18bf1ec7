// Error types for notification delivery and reconciliation

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for notification operations
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Errors reported by the external collaborators (store, change feed)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Notification not found
    #[error("notification not found: {0}")]
    NotFound(Uuid),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Payload could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Channel or subscription was closed
    #[error("channel closed")]
    Closed,
}

/// Remote mutation issued by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    MarkRead,
    MarkAllRead,
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkRead => write!(f, "mark_read"),
            Self::MarkAllRead => write!(f, "mark_all_read"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Errors surfaced by the notification core
///
/// None of these are fatal: the listener and reconciler recover locally and
/// report them through the returned `Result` and a transient notice.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Initial (or refresh) fetch failed
    #[error("failed to load notifications: {0}")]
    Fetch(#[source] StoreError),

    /// Change feed could not be established or dropped
    #[error("realtime subscription failed: {0}")]
    Subscription(#[source] StoreError),

    /// Remote mutation failed
    #[error("{operation} failed: {source}")]
    Mutation {
        operation: MutationKind,
        #[source]
        source: StoreError,
    },

    /// Listener is no longer active for this principal
    #[error("notification session torn down")]
    TornDown,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl NotificationError {
    /// Create a mutation error
    pub fn mutation(operation: MutationKind, source: StoreError) -> Self {
        NotificationError::Mutation { operation, source }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        NotificationError::Configuration(msg.into())
    }

    /// Whether retrying the same call can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            NotificationError::Fetch(_)
            | NotificationError::Subscription(_)
            | NotificationError::Mutation { .. } => true,
            NotificationError::TornDown
            | NotificationError::Configuration(_)
            | NotificationError::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_error_display() {
        let err = NotificationError::mutation(
            MutationKind::Delete,
            StoreError::Unavailable("connection refused".into()),
        );
        assert_eq!(
            err.to_string(),
            "delete failed: store unavailable: connection refused"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_torn_down_is_not_retryable() {
        assert!(!NotificationError::TornDown.is_retryable());
        assert!(!NotificationError::config("bad").is_retryable());
    }
}
