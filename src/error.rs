//! Error types for the hearth hub.

/// Top-level error type for the notification hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// State snapshot load/save error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Coordinator actor error (command channel closed, reply dropped).
    #[error("coordinator error: {0}")]
    Coordinator(String),

    /// Transport error (bind failure, serve failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// Request validation error.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HubError>;
