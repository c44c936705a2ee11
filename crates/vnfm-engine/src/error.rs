//! Error types for engine calls.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by an [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine rejected a write that carried an outdated version token.
    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}
