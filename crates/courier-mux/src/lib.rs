//! Courier Subject Router
//!
//! Routes [`Message`](courier_core::Message)s to handlers by subject.
//!
//! Patterns are split on a delimiter (`/` by default) and may contain:
//! - literal text: `order/kind/game`
//! - named parameters: `order/{user_id}`, matching one segment
//! - a trailing catch-all: `files/*path`, matching the rest of the subject,
//!   possibly empty
//!
//! Literal matches win over parameters, and parameters over catch-alls, no
//! matter in which order the routes were registered.
//!
//! Middlewares attached to the router or to a [`Group`] wrap every route
//! below them; the first registered runs outermost. A group may carry
//! transforms which rewrite a message and route it again from that group,
//! plus default and not-found handlers for subjects nothing else matches.

pub mod error;
pub mod handler;
pub mod middleware;
pub mod mux;
mod trie;

pub use error::RouteError;
pub use handler::{
    handler_fn, link, middleware_fn, subject_fn, ErrorHandler, HandleFunc, Middleware, Next,
    SubjectFn,
};
pub use mux::{post, pre, Group, Mux};
pub use trie::{RouteInfo, RouteKind};
