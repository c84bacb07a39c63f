//! In-process transport
//!
//! [`MemoryEnd::pair`] returns two connected ends sharing one link. The
//! [`MemoryLink`] handle can break the link (receivers and senders on both
//! ends start failing), repair it, or close it for good.

use async_trait::async_trait;
use courier_core::Message;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{TransportFixup, TransportReceiver, TransportSender, TransportStopper};

/// State of a memory link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Broken,
    Closed,
}

/// Shared control handle of a memory link
#[derive(Clone)]
pub struct MemoryLink {
    status: Arc<watch::Sender<LinkStatus>>,
}

impl MemoryLink {
    fn new() -> Self {
        let (tx, _) = watch::channel(LinkStatus::Up);
        Self {
            status: Arc::new(tx),
        }
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Simulate a transport failure; pending receives fail immediately
    pub fn break_link(&self) {
        self.status.send_if_modified(|status| {
            if *status == LinkStatus::Up {
                *status = LinkStatus::Broken;
                true
            } else {
                false
            }
        });
    }

    /// Bring a broken link back up. A closed link stays closed.
    pub fn repair(&self) -> Result<()> {
        let mut result = Ok(());
        self.status.send_if_modified(|status| match *status {
            LinkStatus::Broken => {
                *status = LinkStatus::Up;
                true
            }
            LinkStatus::Closed => {
                result = Err(TransportError::Closed);
                false
            }
            LinkStatus::Up => false,
        });
        result
    }

    /// Close the link for both ends
    pub fn close(&self) {
        self.status.send_replace(LinkStatus::Closed);
    }

    fn check(&self) -> Result<()> {
        match self.status() {
            LinkStatus::Up => Ok(()),
            LinkStatus::Broken => Err(TransportError::ReceiveFailed("link broken".into())),
            LinkStatus::Closed => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl TransportStopper for MemoryLink {
    async fn stop(&self) -> Result<()> {
        debug!("memory link closed");
        self.close();
        Ok(())
    }
}

#[async_trait]
impl TransportFixup for MemoryLink {
    async fn fixup(&self) -> Result<()> {
        self.repair()
    }
}

/// Receiving half of a memory end
pub struct MemoryReceiver {
    rx: mpsc::Receiver<Message>,
    status: watch::Receiver<LinkStatus>,
    link: MemoryLink,
}

#[async_trait]
impl TransportReceiver for MemoryReceiver {
    async fn recv(&mut self) -> Result<Message> {
        loop {
            self.link.check()?;
            tokio::select! {
                msg = self.rx.recv() => {
                    return msg.ok_or(TransportError::Closed);
                }
                changed = self.status.changed() => {
                    if changed.is_err() {
                        return Err(TransportError::Closed);
                    }
                }
            }
        }
    }
}

/// Sending half of a memory end
#[derive(Clone)]
pub struct MemorySender {
    tx: mpsc::Sender<Message>,
    link: MemoryLink,
}

#[async_trait]
impl TransportSender for MemorySender {
    async fn send(&self, msg: Message) -> Result<()> {
        match self.link.status() {
            LinkStatus::Up => {}
            LinkStatus::Broken => {
                return Err(TransportError::SendFailed("link broken".into()));
            }
            LinkStatus::Closed => return Err(TransportError::Closed),
        }
        self.tx.send(msg).await.map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.link.status() == LinkStatus::Up
    }
}

/// One end of a connected in-process pair
pub struct MemoryEnd {
    pub receiver: MemoryReceiver,
    pub sender: MemorySender,
    pub link: MemoryLink,
}

impl MemoryEnd {
    /// Create two connected ends with `capacity` buffered messages per direction
    pub fn pair(capacity: usize) -> (MemoryEnd, MemoryEnd) {
        let link = MemoryLink::new();
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);

        let end = |tx, rx| MemoryEnd {
            receiver: MemoryReceiver {
                rx,
                status: link.status.subscribe(),
                link: link.clone(),
            },
            sender: MemorySender {
                tx,
                link: link.clone(),
            },
            link: link.clone(),
        };

        (end(a_tx, a_rx), end(b_tx, b_rx))
    }
}
