// Error types for bidirectional connections
//
// A connection has exactly one terminal error, observed by every caller of
// `output()` and mirrored into `receive()` views, so `BidiError` is `Clone`.

use thiserror::Error;

use crate::snapshot::StoreError;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, BidiError>;

/// Errors that can occur while starting or driving a connection
#[derive(Debug, Clone, Error)]
pub enum BidiError {
    /// Input was sent after `close()`, or the connection already terminated
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection's context was cancelled
    #[error("connection cancelled")]
    Cancelled,

    /// Start options that cannot be combined
    #[error("conflicting options: {0}")]
    ConflictingOptions(String),

    /// Resume requested from a snapshot the store does not know
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Error reported by the worker function
    #[error("worker error: {0}")]
    Worker(String),

    /// Snapshot store failure
    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BidiError {
    /// Create a worker error
    pub fn worker(msg: impl Into<String>) -> Self {
        BidiError::Worker(msg.into())
    }

    /// Create a conflicting options error
    pub fn conflicting(msg: impl Into<String>) -> Self {
        BidiError::ConflictingOptions(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        BidiError::Configuration(msg.into())
    }

    /// Whether this error is the cancellation kind
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BidiError::Cancelled)
    }

    /// Whether this error reports a closed connection
    pub fn is_closed(&self) -> bool {
        matches!(self, BidiError::ConnectionClosed)
    }
}

impl From<anyhow::Error> for BidiError {
    fn from(err: anyhow::Error) -> Self {
        BidiError::Worker(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for BidiError {
    fn from(err: serde_json::Error) -> Self {
        BidiError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(BidiError::Cancelled.is_cancelled());
        assert!(!BidiError::worker("boom").is_cancelled());
        assert!(BidiError::ConnectionClosed.is_closed());
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err = anyhow::anyhow!("disk full").context("saving transcript");
        let bidi: BidiError = err.into();

        match bidi {
            BidiError::Worker(msg) => {
                assert!(msg.contains("saving transcript"));
                assert!(msg.contains("disk full"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_store_error_conversion() {
        let err: BidiError = StoreError::Backend("unreachable".into()).into();
        assert_eq!(err.to_string(), "snapshot store error: backend error: unreachable");
    }
}
