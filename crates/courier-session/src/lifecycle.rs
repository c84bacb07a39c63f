//! Connect and disconnect hooks

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::session::Session;

/// Runs once, when the session is first used
pub type ConnectHook = Arc<dyn Fn(Arc<Session>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs once, when the session stops
pub type DisconnectHook = Arc<dyn Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Ordered session hooks
///
/// Connect hooks run in registration order and the first failure aborts
/// initialization. Disconnect hooks run in reverse registration order, each
/// to completion.
#[derive(Clone, Default)]
pub struct Lifecycle {
    on_connect: Vec<ConnectHook>,
    on_disconnect: Vec<DisconnectHook>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect<F, Fut>(&mut self, hook: F)
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_connect
            .push(Arc::new(move |session: Arc<Session>| -> BoxFuture<'static, Result<()>> {
                Box::pin(hook(session))
            }));
    }

    pub fn on_disconnect<F, Fut>(&mut self, hook: F)
    where
        F: Fn(Arc<Session>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect
            .push(Arc::new(move |session: Arc<Session>| -> BoxFuture<'static, ()> {
                Box::pin(hook(session))
            }));
    }

    pub fn is_empty(&self) -> bool {
        self.on_connect.is_empty() && self.on_disconnect.is_empty()
    }

    pub(crate) async fn connect(&self, session: &Arc<Session>) -> Result<()> {
        for hook in &self.on_connect {
            hook(session.clone()).await?;
        }
        Ok(())
    }

    pub(crate) async fn disconnect(&self, session: &Arc<Session>) {
        for hook in self.on_disconnect.iter().rev() {
            hook(session.clone()).await;
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("on_connect", &self.on_connect.len())
            .field("on_disconnect", &self.on_disconnect.len())
            .finish()
    }
}
