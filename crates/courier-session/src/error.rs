//! Session error types

use courier_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("already closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no ping received within {0:?}")]
    PingTimeout(Duration),

    #[error("no pong received within {0:?}")]
    PongTimeout(Duration),

    #[error("liveness signal channel closed")]
    SignalClosed,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("core error: {0}")]
    Core(#[from] courier_core::Error),
}

impl SessionError {
    /// Check whether this error only says the session or hub is already closed
    pub fn is_closed(&self) -> bool {
        match self {
            SessionError::Closed => true,
            SessionError::Transport(e) => e.is_closed(),
            SessionError::Core(e) => e.is_closed(),
            _ => false,
        }
    }
}

impl From<SessionError> for courier_core::Error {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Closed => courier_core::Error::Closed,
            SessionError::Core(inner) => inner,
            SessionError::Transport(inner) => inner.into(),
            SessionError::Config(msg) => courier_core::Error::Config(msg),
            SessionError::PingTimeout(_) | SessionError::PongTimeout(_) => {
                courier_core::Error::Timeout
            }
            SessionError::SignalClosed => courier_core::Error::Closed,
        }
    }
}
