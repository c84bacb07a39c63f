//! Courier Transport Layer
//!
//! Sessions are wired to a transport through four capabilities:
//! - [`TransportReceiver`]: blocking receive of one inbound message
//! - [`TransportSender`]: send of one outbound message
//! - [`TransportStopper`]: release of the underlying connection
//! - [`TransportFixup`] (optional): repair of a broken connection
//!
//! Broker specific adapters (WebSocket, AMQP, Kafka, Redis, ...) implement
//! these traits outside of this crate. The [`memory`] module provides a
//! connected in-process pair.

pub mod error;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

pub use error::{Result, TransportError};
pub use traits::{
    fixup_fn, recv_fn, send_fn, stop_fn, FnFixup, FnReceiver, FnSender, FnStopper,
    TransportFixup, TransportReceiver, TransportSender, TransportStopper,
};

#[cfg(feature = "memory")]
pub use memory::{LinkStatus, MemoryEnd, MemoryLink, MemoryReceiver, MemorySender};
