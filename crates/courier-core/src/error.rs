//! Error types for courier

use thiserror::Error;

/// Result type alias for courier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by handlers, middleware and capabilities
#[derive(Error, Debug)]
pub enum Error {
    /// No handler, default handler or not-found handler matched the subject
    #[error("no route for subject: {0:?}")]
    NotFound(String),

    /// The adapter, hub or transport has already been stopped
    #[error("already closed")]
    Closed,

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,

    /// A handler panicked and the panic was recovered by middleware
    #[error("handler panicked: {0}")]
    Panic(String),

    /// Setup-time configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Subject pattern could not be parsed
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Transport level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A filter middleware refused the message
    #[error("message rejected: {0}")]
    Rejected(String),

    /// Application handler failure
    #[error("handler error: {0}")]
    Handler(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Returns true for the "already closed" class of errors.
    ///
    /// Repeat stops and sends on a stopped adapter produce this error, so
    /// callers can treat it as benign.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }

    /// Returns true when routing found no handler
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Shorthand for [`Error::Handler`]
    pub fn handler(msg: impl Into<String>) -> Self {
        Error::Handler(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_classification() {
        assert!(Error::Closed.is_closed());
        assert!(!Error::Timeout.is_closed());
        assert!(Error::NotFound("a/b".into()).is_not_found());
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
