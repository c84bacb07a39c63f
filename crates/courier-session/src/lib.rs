//! Courier Session
//!
//! Everything that runs on top of one transport connection:
//! - [`Session`]: listen loop, egress routing, connect/disconnect hooks
//! - Ping-pong liveness in either role
//! - Reliable tasks that retry with backoff and repair with a fixup
//! - [`Hub`]: keyed registry of live sessions with eviction and broadcast
//!
//! # Example
//!
//! ```no_run
//! use courier_mux::Mux;
//! use courier_session::{PingPongConfig, SessionBuilder, SessionConfig};
//! use courier_transport::MemoryEnd;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (local, _remote) = MemoryEnd::pair(64);
//!
//!     let mut ingress = Mux::new();
//!     ingress.handler("pong", courier_session::notify_handler());
//!
//!     let session = SessionBuilder::new()
//!         .memory(local)
//!         .ingress(Arc::new(ingress))
//!         .config(SessionConfig {
//!             ping_pong: Some(PingPongConfig::initiator(Duration::from_secs(10))),
//!             ..Default::default()
//!         })
//!         .build()?;
//!
//!     session.spawn_ping_pong();
//!     session.listen().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod pingpong;
pub mod session;
pub mod task;

pub use builder::SessionBuilder;
pub use config::{
    FailurePolicy, HubConfig, PingPongConfig, PingPongRole, RetryPolicy, SessionConfig,
};
pub use error::{Result, SessionError};
pub use hub::{Hub, Member};
pub use lifecycle::{ConnectHook, DisconnectHook, Lifecycle};
pub use pingpong::{notify_handler, send_ping_wait_pong, wait_ping_send_pong, Signal};
pub use session::{egress_sink, Session, SessionId};
pub use task::{reliable_task, reliable_task_with_fixup, Backoff};
