//! Context and peer capability tests

use async_trait::async_trait;
use courier_core::{Context, DataStore, Error, Message, Peer, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Peer that records what handlers send through it
#[derive(Default)]
struct LoopbackPeer {
    sent: Mutex<Vec<String>>,
    raw: Mutex<Vec<String>>,
    signals: AtomicU32,
    stopped: AtomicBool,
}

#[async_trait]
impl Peer for LoopbackPeer {
    fn id(&self) -> &str {
        "loopback"
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn send(&self, msg: Message) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::Closed);
        }
        self.sent.lock().push(msg.subject);
        Ok(())
    }

    async fn raw_send(&self, msg: Message) -> Result<()> {
        self.raw.lock().push(msg.subject);
        Ok(())
    }

    fn notify_ping_pong(&self) {
        self.signals.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_handler_replies_through_peer() {
    let peer = Arc::new(LoopbackPeer::default());
    let ctx = Context::new().with_peer(peer.clone());

    let reply = ctx.peer().expect("peer attached");
    assert_eq!(reply.id(), "loopback");
    reply.send(Message::new("ack/1")).await.unwrap();
    reply.raw_send(Message::new("wire/1")).await.unwrap();
    reply.notify_ping_pong();

    assert_eq!(*peer.sent.lock(), vec!["ack/1".to_string()]);
    assert_eq!(*peer.raw.lock(), vec!["wire/1".to_string()]);
    assert_eq!(peer.signals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeat_stop_is_closed() {
    let peer = Arc::new(LoopbackPeer::default());
    let ctx = Context::new().with_peer(peer);
    let peer = ctx.peer().unwrap();

    peer.stop().await.unwrap();
    let err = peer.stop().await.unwrap_err();
    assert!(err.is_closed());
    assert!(peer.send(Message::new("late")).await.unwrap_err().is_closed());
}

#[test]
fn test_cloned_context_shares_data() {
    let data = Arc::new(DataStore::new());
    let ctx = Context::new().with_data(data.clone());
    let copy = ctx.clone();

    data.insert("limit", 10u32);
    assert_eq!(copy.get::<u32>("limit").as_deref(), Some(&10));
    assert!(copy.data().remove("limit"));
    assert!(ctx.data().is_empty());
}

#[test]
fn test_errors_classify() {
    assert!(Error::Closed.is_closed());
    assert!(Error::NotFound("a/b".into()).is_not_found());
    assert!(!Error::handler("boom").is_closed());
    assert_eq!(
        Error::NotFound("a/b".into()).to_string(),
        "no route for subject: \"a/b\""
    );

    let wrapped: Error = anyhow::anyhow!("database unavailable").into();
    assert_eq!(wrapped.to_string(), "database unavailable");
}
