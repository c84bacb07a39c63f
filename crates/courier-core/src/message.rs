//! The routed message envelope

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::CORRELATION_ID_KEY;

/// Opaque application payload attached to a message
pub type Body = Arc<dyn Any + Send + Sync>;

/// Route parameters bound while matching `{name}` and `*name` segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteParams {
    params: HashMap<String, String>,
}

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Get a parameter as a string slice
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    /// Parse a parameter into any `FromStr` type
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }
}

/// String-keyed side-channel values carried with a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    values: HashMap<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get the correlation id, if one was assigned
    pub fn correlation_id(&self) -> Option<&str> {
        self.get_str(CORRELATION_ID_KEY)
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.set(CORRELATION_ID_KEY, Value::String(id.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// A routed message
///
/// The `subject` is the routing key. `bytes` holds the raw payload as it
/// arrived from (or will leave through) a transport, while the body is an
/// optional decoded application value. Cloning shares the body.
#[derive(Clone, Default)]
pub struct Message {
    /// Routing key
    pub subject: String,
    /// Raw payload
    pub bytes: Bytes,
    /// Parameters bound during routing
    pub route_params: RouteParams,
    /// Side-channel values
    pub metadata: Metadata,
    body: Option<Body>,
    id: Option<String>,
}

impl Message {
    /// Create a message for a subject
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Set the raw payload
    pub fn with_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.bytes = bytes.into();
        self
    }

    /// Attach a typed body
    pub fn with_body<T: Any + Send + Sync>(mut self, body: T) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn set_body<T: Any + Send + Sync>(&mut self, body: T) {
        self.body = Some(Arc::new(body));
    }

    /// Borrow the body as `T`, if present and of that type
    pub fn body<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.body.as_ref().and_then(|b| b.downcast_ref::<T>())
    }

    /// Take the shared body, leaving none
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Get the message id, generating one on first access
    pub fn id(&mut self) -> &str {
        self.id.get_or_insert_with(|| Uuid::new_v4().to_string())
    }

    /// Get the message id without generating one
    pub fn peek_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Clear every field so the message can be reused
    pub fn reset(&mut self) {
        self.subject.clear();
        self.bytes = Bytes::new();
        self.route_params.clear();
        self.metadata.clear();
        self.body = None;
        self.id = None;
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.subject)
            .field("bytes", &self.bytes.len())
            .field("route_params", &self.route_params)
            .field("metadata", &self.metadata)
            .field("has_body", &self.body.is_some())
            .field("id", &self.id)
            .finish()
    }
}

/// A free list of reset messages
///
/// Reuse only saves allocations of the inner maps and strings; ordinary
/// allocation through [`Message::new`] behaves identically.
pub struct MessagePool {
    free: Mutex<Vec<Message>>,
    capacity: usize,
}

impl MessagePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take a cleared message from the pool
    pub fn get(&self) -> Message {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Reset a message and return it to the pool
    pub fn put(&self, mut msg: Message) {
        msg.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(msg);
        }
    }

    /// Number of messages waiting for reuse
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new(1024)
    }
}
