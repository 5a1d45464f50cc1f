//! Error types for the sync engine.

use localsync_protocol::EntityKind;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (malformed payload or response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No account context configured at start.
    #[error("no account configured for sync")]
    MissingAccount,

    /// Local store error.
    #[error("store error: {0}")]
    Store(String),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No adapter registered for an entity kind.
    #[error("no adapter registered for kind {0}")]
    UnknownKind(EntityKind),

    /// Server rejected the request.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns true if the failed operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport { retryable, .. } => *retryable,
            EngineError::Timeout => true,
            EngineError::Server { status, .. } => localsync_protocol::is_transient_status(*status),
            _ => false,
        }
    }
}
