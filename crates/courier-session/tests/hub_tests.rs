//! Hub registry tests

use async_trait::async_trait;
use courier_core::Message;
use courier_session::{Hub, HubConfig, Member, SessionBuilder, SessionError};
use courier_test_utils::{
    memory_pair, recv_within, wait_for, wait_with_notify, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT,
};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Member that counts its stops
struct Worker {
    key: String,
    group: &'static str,
    stopped: AtomicBool,
    stops: AtomicU32,
    done: watch::Sender<bool>,
}

impl Worker {
    fn new(key: &str, group: &'static str) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            key: key.to_string(),
            group,
            stopped: AtomicBool::new(false),
            stops: AtomicU32::new(0),
            done,
        })
    }

    fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Member for Worker {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> courier_session::Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.done.send_replace(true);
        Ok(())
    }

    async fn wait_stop(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }
}

async fn hub_with(workers: &[Arc<Worker>]) -> Hub<Worker> {
    let hub = Hub::default();
    for worker in workers {
        hub.join(worker.clone()).await.unwrap();
    }
    hub
}

// ============================================================================
// Join and eviction
// ============================================================================

#[tokio::test]
async fn test_join_evicts_previous_occupant() {
    let x = Worker::new("device-1", "a");
    let y = Worker::new("device-1", "a");
    let hub = hub_with(&[x.clone()]).await;

    hub.join(y.clone()).await.unwrap();

    assert_eq!(x.stops(), 1);
    assert!(x.is_stopped());
    assert_eq!(y.stops(), 0);
    assert_eq!(hub.len(), 1);
    let occupant = hub.find_by_key("device-1").unwrap();
    assert!(Arc::ptr_eq(&occupant, &y));
}

#[tokio::test]
async fn test_rejoin_same_member_is_noop() {
    let x = Worker::new("device-1", "a");
    let hub = hub_with(&[x.clone()]).await;

    hub.join(x.clone()).await.unwrap();
    assert_eq!(x.stops(), 0);
    assert_eq!(hub.len(), 1);
}

#[tokio::test]
async fn test_concurrent_joins_leave_one_occupant() {
    let hub = Arc::new(Hub::<Worker>::default());
    let workers: Vec<_> = (0..8).map(|_| Worker::new("shared", "a")).collect();

    let joins: Vec<_> = workers
        .iter()
        .map(|worker| {
            let hub = hub.clone();
            let worker = worker.clone();
            tokio::spawn(async move { hub.join(worker).await })
        })
        .collect();
    for join in joins {
        join.await.unwrap().unwrap();
    }

    assert_eq!(hub.len(), 1);
    let live: Vec<_> = workers.iter().filter(|w| !w.is_stopped()).collect();
    assert_eq!(live.len(), 1);
    assert!(Arc::ptr_eq(&hub.find_by_key("shared").unwrap(), live[0]));
    assert!(workers.iter().all(|w| w.stops() <= 1));
}

#[tokio::test]
async fn test_stopped_member_leaves_hub() {
    let x = Worker::new("device-1", "a");
    let y = Worker::new("device-2", "a");
    let hub = hub_with(&[x.clone(), y.clone()]).await;

    x.stop().await.unwrap();
    let left = wait_for(
        || async { hub.find_by_key("device-1").is_none() },
        DEFAULT_CHECK_INTERVAL,
        DEFAULT_TIMEOUT,
    )
    .await;
    assert!(left);
    assert_eq!(hub.keys(), vec!["device-2".to_string()]);
}

#[tokio::test]
async fn test_evicted_member_does_not_remove_successor() {
    let x = Worker::new("device-1", "a");
    let y = Worker::new("device-1", "a");
    let hub = hub_with(&[x.clone()]).await;
    hub.join(y.clone()).await.unwrap();

    // Give the watcher of the evicted member a chance to run.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let occupant = hub.find_by_key("device-1").unwrap();
    assert!(Arc::ptr_eq(&occupant, &y));
}

// ============================================================================
// Find and remove
// ============================================================================

#[tokio::test]
async fn test_find_by_filter() {
    let workers = [
        Worker::new("a1", "a"),
        Worker::new("a2", "a"),
        Worker::new("b1", "b"),
    ];
    let hub = hub_with(&workers).await;

    assert_eq!(hub.find_one(|w| w.group == "b").unwrap().key(), "b1");
    assert!(hub.find_one(|w| w.group == "c").is_none());

    let mut keys: Vec<_> = hub
        .find_multi(|w| w.group == "a")
        .iter()
        .map(|w| w.key().to_string())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["a1", "a2"]);
}

#[tokio::test]
async fn test_remove_stops_members() {
    let workers = [
        Worker::new("a1", "a"),
        Worker::new("a2", "a"),
        Worker::new("b1", "b"),
        Worker::new("c1", "c"),
    ];
    let hub = hub_with(&workers).await;

    let removed = hub.remove_by_key("c1").await.unwrap();
    assert_eq!(removed.stops(), 1);
    assert!(hub.remove_by_key("c1").await.is_none());

    let removed = hub.remove_one(|w| w.group == "b").await.unwrap();
    assert_eq!(removed.key(), "b1");
    assert!(removed.is_stopped());

    let removed = hub.remove_multi(|w| w.group == "a").await;
    assert_eq!(removed.len(), 2);
    assert!(removed.iter().all(|w| w.stops() == 1));
    assert!(hub.is_empty());
}

// ============================================================================
// Iteration
// ============================================================================

#[tokio::test]
async fn test_do_sync_stops_early() {
    let workers: Vec<_> = (0..5)
        .map(|i| Worker::new(&format!("w{}", i), "a"))
        .collect();
    let hub = hub_with(&workers).await;

    let mut visited = 0;
    hub.do_sync(|_member| {
        visited += 1;
        if visited == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    assert_eq!(visited, 2);

    let mut all = 0;
    hub.do_sync(|_member| {
        all += 1;
        ControlFlow::Continue(())
    });
    assert_eq!(all, 5);
}

#[tokio::test]
async fn test_do_async_respects_concurrency_limit() {
    let hub = Hub::new(HubConfig {
        name: "limited".to_string(),
        concurrency_limit: 2,
    });
    for i in 0..6 {
        hub.join(Worker::new(&format!("w{}", i), "a")).await.unwrap();
    }

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let visited = Arc::new(AtomicUsize::new(0));

    let (r, p, v) = (running.clone(), peak.clone(), visited.clone());
    hub.do_async(move |_member| {
        let (running, peak, visited) = (r.clone(), p.clone(), v.clone());
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            visited.fetch_add(1, Ordering::SeqCst);
        }
    })
    .await;

    assert_eq!(visited.load(Ordering::SeqCst), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(running.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_is_terminal() {
    let workers = [Worker::new("w1", "a"), Worker::new("w2", "a")];
    let hub = Arc::new(hub_with(&workers).await);
    let shut = Arc::new(Notify::new());

    {
        let hub = hub.clone();
        let shut = shut.clone();
        tokio::spawn(async move {
            hub.wait_shutdown().await;
            shut.notify_one();
        });
    }

    hub.shutdown().await.unwrap();
    assert!(hub.is_shutdown());
    assert!(hub.is_empty());
    assert!(workers.iter().all(|w| w.stops() == 1));
    assert!(wait_with_notify(&shut, DEFAULT_TIMEOUT).await);

    let late = Worker::new("w3", "a");
    assert!(matches!(
        hub.join(late.clone()).await,
        Err(SessionError::Closed)
    ));
    assert!(hub.is_empty());

    assert!(matches!(hub.shutdown().await, Err(SessionError::Closed)));
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_broadcast_reaches_every_session() {
    let hub: Hub<courier_session::Session> = Hub::default();
    let mut remotes = Vec::new();
    for i in 0..3 {
        let (local, remote) = memory_pair(8);
        let session = SessionBuilder::new()
            .id(format!("client-{}", i))
            .memory(local)
            .build()
            .unwrap();
        hub.join(session).await.unwrap();
        remotes.push(remote);
    }

    let delivered = hub.broadcast(Message::new("notice").with_bytes("maintenance")).await;
    assert_eq!(delivered, 3);
    for remote in remotes.iter_mut() {
        let msg = recv_within(remote, DEFAULT_TIMEOUT).await;
        assert_eq!(msg.subject, "notice");
        assert_eq!(&msg.bytes[..], b"maintenance");
    }
}

#[tokio::test]
async fn test_broadcast_skips_stopped_sessions() {
    let hub: Hub<courier_session::Session> = Hub::default();
    let (a, _ra) = memory_pair(8);
    let (b, _rb) = memory_pair(8);
    let live = SessionBuilder::new().id("live").memory(a).build().unwrap();
    let gone = SessionBuilder::new().id("gone").memory(b).build().unwrap();
    hub.join(live).await.unwrap();
    hub.join(gone.clone()).await.unwrap();

    gone.stop().await.unwrap();
    assert!(
        wait_for(
            || async { hub.len() == 1 },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        )
        .await
    );
    assert_eq!(hub.broadcast(Message::new("notice")).await, 1);
}

#[tokio::test]
async fn test_session_key_is_id() {
    let hub: Hub<courier_session::Session> = Hub::default();
    let (first, _r1) = memory_pair(8);
    let (second, _r2) = memory_pair(8);
    let old = SessionBuilder::new().id("dup").memory(first).build().unwrap();
    let new = SessionBuilder::new().id("dup").memory(second).build().unwrap();

    hub.join(old.clone()).await.unwrap();
    hub.join(new.clone()).await.unwrap();

    assert!(old.is_stop());
    assert!(!new.is_stop());
    assert!(Arc::ptr_eq(&hub.find_by_key("dup").unwrap(), &new));
    hub.shutdown().await.unwrap();
    assert!(new.is_stop());
}
