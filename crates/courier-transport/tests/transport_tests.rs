//! Transport capability tests

use courier_core::Message;
use courier_transport::{
    fixup_fn, recv_fn, send_fn, stop_fn, LinkStatus, MemoryEnd, TransportError, TransportFixup,
    TransportReceiver, TransportSender, TransportStopper,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_closure_adapters() {
    let (tx, mut rx) = mpsc::channel::<Message>(4);
    let (in_tx, in_rx) = mpsc::channel::<Message>(4);
    let in_rx = Arc::new(tokio::sync::Mutex::new(in_rx));

    let sender = send_fn(move |msg| {
        let tx = tx.clone();
        async move { tx.send(msg).await.map_err(|_| TransportError::Closed) }
    });
    let mut receiver = recv_fn(move || {
        let in_rx = in_rx.clone();
        async move { in_rx.lock().await.recv().await.ok_or(TransportError::Closed) }
    });

    sender.send(Message::new("out")).await.unwrap();
    assert_eq!(rx.recv().await.unwrap().subject, "out");

    in_tx.send(Message::new("in")).await.unwrap();
    assert_eq!(receiver.recv().await.unwrap().subject, "in");

    drop(in_tx);
    assert!(receiver.recv().await.unwrap_err().is_closed());
}

#[tokio::test]
async fn test_stop_and_fixup_closures() {
    let stops = Arc::new(AtomicU32::new(0));
    let counter = stops.clone();
    let stopper = stop_fn(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });
    let fixup = fixup_fn(|| async { Err(TransportError::ConnectionFailed("refused".into())) });

    stopper.stop().await.unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert!(fixup.fixup().await.is_err());
}

#[tokio::test]
async fn test_memory_link_lifecycle() {
    let (mut a, b) = MemoryEnd::pair(4);

    b.link.break_link();
    assert_eq!(a.link.status(), LinkStatus::Broken);
    assert!(!a.sender.is_connected());
    assert!(a.receiver.recv().await.is_err());
    assert!(b.sender.send(Message::new("lost")).await.is_err());

    a.link.fixup().await.unwrap();
    b.sender.send(Message::new("back")).await.unwrap();
    assert_eq!(a.receiver.recv().await.unwrap().subject, "back");

    a.link.stop().await.unwrap();
    assert_eq!(b.link.status(), LinkStatus::Closed);
    assert!(b.link.repair().is_err());
    assert!(a.receiver.recv().await.unwrap_err().is_closed());
}
