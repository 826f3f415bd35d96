//! Error types for the synchronization engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during a synchronization run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required configuration value was not given.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// The named pipeline configuration could not be loaded.
    #[error("unknown pipeline configuration: {0:?}")]
    UnknownPipeline(String),

    /// The named remote could not be loaded.
    #[error("unknown remote: {0:?}")]
    UnknownRemote(String),

    /// The named channel is not among the remote's advertised channels.
    #[error("remote {remote:?} does not advertise channel {channel:?}")]
    UnknownChannel {
        /// Remote id.
        remote: String,
        /// Channel id.
        channel: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A remote document could not be decoded.
    #[error(transparent)]
    Protocol(#[from] mirrorkit_protocol::ProtocolError),

    /// Local storage error.
    #[error("store error: {0}")]
    Store(String),

    /// A processor reported an item-level failure.
    #[error("processor {processor} failed: {message}")]
    ProcessorFailed {
        /// Processor id.
        processor: String,
        /// Failure message.
        message: String,
    },

    /// The run was cancelled between pages.
    #[error("import cancelled")]
    Cancelled,
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

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::transport_retryable("connection reset").is_retryable());
        assert!(!EngineError::transport_fatal("certificate rejected").is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(!EngineError::UnknownRemote("site_a".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EngineError::UnknownChannel {
            remote: "site_a".into(),
            channel: "articles".into(),
        };
        assert!(err.to_string().contains("site_a"));
        assert!(err.to_string().contains("articles"));
    }
}
