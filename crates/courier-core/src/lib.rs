//! Courier Core
//!
//! Core types shared by every courier crate:
//! - The routed message envelope ([`Message`], [`RouteParams`], [`Metadata`])
//! - The handler capability object ([`Context`]) and the [`Peer`] trait that
//!   lets handlers reply through the session that received a message
//! - Subject pattern parsing ([`Pattern`], [`Segment`])
//! - The shared [`Error`] type

pub mod context;
pub mod error;
pub mod message;
pub mod subject;

pub use context::{Context, DataStore, Peer};
pub use error::{Error, Result};
pub use message::{Message, MessagePool, Metadata, RouteParams};
pub use subject::{Pattern, Segment};

/// Metadata key holding the correlation id of a message
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// Default delimiter between subject segments
pub const DEFAULT_DELIMITER: &str = "/";
