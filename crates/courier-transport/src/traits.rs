//! Transport capability definitions

use async_trait::async_trait;
use courier_core::Message;
use std::future::Future;

use crate::error::Result;

/// Trait for receiving messages
#[async_trait]
pub trait TransportReceiver: Send {
    /// Wait for the next inbound message.
    ///
    /// Returns [`TransportError::Closed`](crate::TransportError::Closed) once
    /// the connection has been shut down gracefully.
    async fn recv(&mut self) -> Result<Message>;
}

/// Trait for sending messages
///
/// The framework does not serialize calls to `send`; an implementation that
/// needs ordered writes must lock around its underlying transport.
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one message
    async fn send(&self, msg: Message) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool {
        true
    }
}

/// Trait for releasing a transport
///
/// Sessions invoke this at most once.
#[async_trait]
pub trait TransportStopper: Send + Sync {
    async fn stop(&self) -> Result<()>;
}

/// Trait for repairing a broken transport (reconnect, re-subscribe, ...)
#[async_trait]
pub trait TransportFixup: Send + Sync {
    /// Attempt one repair; `Ok` means the transport is usable again
    async fn fixup(&self) -> Result<()>;
}

/// [`TransportReceiver`] backed by a closure
pub struct FnReceiver<F>(F);

/// Wrap a closure returning a receive future
pub fn recv_fn<F, Fut>(f: F) -> FnReceiver<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Message>> + Send,
{
    FnReceiver(f)
}

#[async_trait]
impl<F, Fut> TransportReceiver for FnReceiver<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Message>> + Send,
{
    async fn recv(&mut self) -> Result<Message> {
        (self.0)().await
    }
}

/// [`TransportSender`] backed by a closure
pub struct FnSender<F>(F);

/// Wrap a closure returning a send future
pub fn send_fn<F, Fut>(f: F) -> FnSender<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnSender(f)
}

#[async_trait]
impl<F, Fut> TransportSender for FnSender<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn send(&self, msg: Message) -> Result<()> {
        (self.0)(msg).await
    }
}

/// [`TransportStopper`] backed by a closure
pub struct FnStopper<F>(F);

/// Wrap a closure returning a stop future
pub fn stop_fn<F, Fut>(f: F) -> FnStopper<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnStopper(f)
}

#[async_trait]
impl<F, Fut> TransportStopper for FnStopper<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn stop(&self) -> Result<()> {
        (self.0)().await
    }
}

/// [`TransportFixup`] backed by a closure
pub struct FnFixup<F>(F);

/// Wrap a closure returning a repair future
pub fn fixup_fn<F, Fut>(f: F) -> FnFixup<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnFixup(f)
}

#[async_trait]
impl<F, Fut> TransportFixup for FnFixup<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn fixup(&self) -> Result<()> {
        (self.0)().await
    }
}
