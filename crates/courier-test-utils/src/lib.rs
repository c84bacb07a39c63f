//! Common test helpers and utilities for courier tests
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - Tracing output for failing tests
//! - Recorders for asserting call order
//! - In-memory transport pairs

use courier_core::Message;
use courier_transport::{MemoryEnd, TransportReceiver, TransportSender};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Tracing
// ============================================================================

/// Install a test subscriber honoring `RUST_LOG`; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_for(
        || async { flag.load(Ordering::SeqCst) },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait with notification - more efficient than polling
pub async fn wait_with_notify(notify: &Notify, max_wait: Duration) -> bool {
    timeout(max_wait, notify.notified()).await.is_ok()
}

// ============================================================================
// Recorder - ordered log of events
// ============================================================================

/// Thread-safe ordered log of labels, for asserting call order
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<parking_lot::Mutex<Vec<String>>>,
    count: Arc<AtomicU32>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Get the number of recorded events
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n events to be recorded
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait).await
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.lock().iter().any(|e| e == event)
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

// ============================================================================
// Transport helpers
// ============================================================================

/// Connected in-memory pair with room for `capacity` messages each way
pub fn memory_pair(capacity: usize) -> (MemoryEnd, MemoryEnd) {
    MemoryEnd::pair(capacity)
}

/// Send `subject` with `payload` through the sending half of `end`
pub async fn send_text(end: &MemoryEnd, subject: &str, payload: &str) {
    end.sender
        .send(Message::new(subject).with_bytes(payload.to_string()))
        .await
        .expect("memory send");
}

/// Receive the next message on `end`, failing the test after `max_wait`
pub async fn recv_within(end: &mut MemoryEnd, max_wait: Duration) -> Message {
    timeout(max_wait, end.receiver.recv())
        .await
        .expect("timed out waiting for message")
        .expect("memory receive")
}
