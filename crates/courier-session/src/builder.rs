//! Session builder pattern

use courier_core::DataStore;
use courier_mux::Mux;
use courier_transport::{TransportFixup, TransportReceiver, TransportSender, TransportStopper};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::lifecycle::Lifecycle;
use crate::session::{Parts, Session};

/// Builder for [`Session`]
///
/// The receiver, sender and stopper are required; everything else is
/// optional.
///
/// ```
/// use courier_session::SessionBuilder;
/// use courier_transport::MemoryEnd;
///
/// # async fn example() -> courier_session::Result<()> {
/// let (local, _remote) = MemoryEnd::pair(16);
/// let session = SessionBuilder::new()
///     .id("device-7")
///     .memory(local)
///     .build()?;
/// assert_eq!(session.id(), "device-7");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    id: Option<String>,
    receiver: Option<Box<dyn TransportReceiver>>,
    sender: Option<Arc<dyn TransportSender>>,
    stopper: Option<Arc<dyn TransportStopper>>,
    fixup: Option<Arc<dyn TransportFixup>>,
    ingress: Option<Arc<Mux>>,
    egress: Option<Arc<Mux>>,
    config: SessionConfig,
    lifecycle: Lifecycle,
    data: DataStore,
}

impl SessionBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session id (its hub key); a random UUID otherwise
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn receiver(mut self, receiver: impl TransportReceiver + 'static) -> Self {
        self.receiver = Some(Box::new(receiver));
        self
    }

    pub fn sender(mut self, sender: impl TransportSender + 'static) -> Self {
        self.sender = Some(Arc::new(sender));
        self
    }

    pub fn stopper(mut self, stopper: impl TransportStopper + 'static) -> Self {
        self.stopper = Some(Arc::new(stopper));
        self
    }

    /// Repair function used when receiving or ping-pong fails
    pub fn fixup(mut self, fixup: impl TransportFixup + 'static) -> Self {
        self.fixup = Some(Arc::new(fixup));
        self
    }

    /// Use one end of an in-memory pair as receiver, sender and stopper
    #[cfg(feature = "memory")]
    pub fn memory(self, end: courier_transport::MemoryEnd) -> Self {
        self.receiver(end.receiver)
            .sender(end.sender)
            .stopper(end.link)
    }

    /// Router for received messages
    pub fn ingress(mut self, mux: Arc<Mux>) -> Self {
        self.ingress = Some(mux);
        self
    }

    /// Router for sent messages; its handlers finish with
    /// [`egress_sink`](crate::session::egress_sink) or a `raw_send` of their own
    pub fn egress(mut self, mux: Arc<Mux>) -> Self {
        self.egress = Some(mux);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a hook run when the session is first used
    pub fn on_connect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.lifecycle.on_connect(hook);
        self
    }

    /// Add a hook run when the session stops
    pub fn on_disconnect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.on_disconnect(hook);
        self
    }

    /// Store application data visible to handlers through the context
    pub fn data<T: Any + Send + Sync>(self, key: impl Into<String>, value: T) -> Self {
        self.data.insert(key, value);
        self
    }

    /// Build the session; fails when a required capability is missing or
    /// the retry policy is unusable
    pub fn build(self) -> Result<Arc<Session>> {
        let receiver = self.receiver.ok_or_else(|| missing("receiver"))?;
        let sender = self.sender.ok_or_else(|| missing("sender"))?;
        let stopper = self.stopper.ok_or_else(|| missing("stopper"))?;
        self.config.retry.validate()?;

        Ok(Session::from_parts(Parts {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            receiver,
            sender,
            stopper,
            fixup: self.fixup,
            ingress: self.ingress,
            egress: self.egress,
            config: self.config,
            lifecycle: self.lifecycle,
            data: self.data,
        }))
    }
}

fn missing(what: &str) -> SessionError {
    SessionError::Config(format!("session has no {}", what))
}
