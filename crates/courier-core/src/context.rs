//! Handler capabilities
//!
//! Handlers receive a [`Context`] next to the message. It exposes the
//! session's tracing span, its keyed application data and, when dispatch was
//! started by a session, the [`Peer`] that can send replies.

use async_trait::async_trait;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use tracing::Span;

use crate::{Message, Result};

/// The session side of a dispatch, as seen by handlers
#[async_trait]
pub trait Peer: Send + Sync {
    /// Identifier of the session (its hub key)
    fn id(&self) -> &str;

    /// Check whether the session has been stopped
    fn is_stopped(&self) -> bool;

    /// Send through the session's egress router, if any
    async fn send(&self, msg: Message) -> Result<()>;

    /// Send straight to the transport, skipping the egress router
    async fn raw_send(&self, msg: Message) -> Result<()>;

    /// Feed one ping or pong into the session's liveness loop
    fn notify_ping_pong(&self);

    /// Stop the session
    async fn stop(&self) -> Result<()>;
}

/// Keyed application data shared between a session and its handlers
#[derive(Default)]
pub struct DataStore {
    values: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Get a value of type `T`; `None` if missing or of another type
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.values.get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Capability object passed to every handler and middleware
#[derive(Clone)]
pub struct Context {
    span: Span,
    peer: Option<Arc<dyn Peer>>,
    data: Arc<DataStore>,
}

impl Context {
    /// A detached context: no peer, disabled span, empty data
    pub fn new() -> Self {
        Self {
            span: Span::none(),
            peer: None,
            data: Arc::new(DataStore::new()),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_peer(mut self, peer: Arc<dyn Peer>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_data(mut self, data: Arc<DataStore>) -> Self {
        self.data = data;
        self
    }

    /// Span to log under
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Session that dispatched the message, if any
    pub fn peer(&self) -> Option<&Arc<dyn Peer>> {
        self.peer.as_ref()
    }

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    /// Shorthand for `data().get::<T>(key)`
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.data.get(key)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("peer", &self.peer.as_ref().map(|p| p.id().to_string()))
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_data() {
        let ctx = Context::new();
        ctx.data().insert("user", String::from("alice"));
        assert_eq!(ctx.get::<String>("user").as_deref(), Some(&"alice".to_string()));
        assert!(ctx.get::<u32>("user").is_none());
        assert!(ctx.peer().is_none());
    }
}
