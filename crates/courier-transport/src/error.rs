//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Graceful shutdown of the connection
    #[error("connection closed")]
    Closed,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Returns true for a graceful close
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

impl From<TransportError> for courier_core::Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => courier_core::Error::Closed,
            other => courier_core::Error::Transport(other.to_string()),
        }
    }
}
