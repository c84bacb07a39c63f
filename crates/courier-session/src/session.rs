//! Session management
//!
//! A [`Session`] binds one transport connection to the framework: it owns the
//! receive, send and stop capabilities, runs the listen loop through an
//! ingress router, sends through an optional egress router, keeps the
//! connection alive with ping-pong, and repairs the transport with the
//! configured fixup.
//!
//! ```text
//!   new --first use--> running --stop()--> stopping --hooks done--> stopped
//! ```
//!
//! [`Session::is_stop`] turns true as soon as `stop` is called;
//! [`Session::wait_stop`] resolves once teardown has finished.

use async_trait::async_trait;
use courier_core::{Context, DataStore, Message, Peer};
use courier_mux::{handler_fn, HandleFunc, Mux};
use courier_transport::{TransportFixup, TransportReceiver, TransportSender, TransportStopper};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

use crate::config::{FailurePolicy, PingPongRole, SessionConfig};
use crate::error::{Result, SessionError};
use crate::lifecycle::Lifecycle;
use crate::pingpong::{self, Signal};
use crate::task;

/// Session identifier
pub type SessionId = String;

/// Pending liveness signals kept per session
const SIGNAL_CAPACITY: usize = 16;

/// One transport connection and everything running on it
pub struct Session {
    id: SessionId,
    this: Weak<Session>,
    receiver: Mutex<Box<dyn TransportReceiver>>,
    sender: Arc<dyn TransportSender>,
    stopper: Arc<dyn TransportStopper>,
    fixup: Option<Arc<dyn TransportFixup>>,
    ingress: Option<Arc<Mux>>,
    egress: Option<Arc<Mux>>,
    config: SessionConfig,
    lifecycle: Lifecycle,
    data: Arc<DataStore>,
    span: Span,
    stopped: AtomicBool,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    done: watch::Sender<bool>,
    signal_tx: mpsc::Sender<Signal>,
    signal_rx: Mutex<mpsc::Receiver<Signal>>,
    created_at: Instant,
    last_activity: RwLock<Instant>,
}

/// Everything a session is assembled from; filled in by
/// [`SessionBuilder`](crate::SessionBuilder)
pub(crate) struct Parts {
    pub(crate) id: SessionId,
    pub(crate) receiver: Box<dyn TransportReceiver>,
    pub(crate) sender: Arc<dyn TransportSender>,
    pub(crate) stopper: Arc<dyn TransportStopper>,
    pub(crate) fixup: Option<Arc<dyn TransportFixup>>,
    pub(crate) ingress: Option<Arc<Mux>>,
    pub(crate) egress: Option<Arc<Mux>>,
    pub(crate) config: SessionConfig,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) data: DataStore,
}

impl Session {
    pub(crate) fn from_parts(parts: Parts) -> Arc<Self> {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (done, _) = watch::channel(false);
        let span = tracing::info_span!("session", id = %parts.id);
        let now = Instant::now();

        Arc::new_cyclic(|this| Self {
            id: parts.id,
            this: this.clone(),
            receiver: Mutex::new(parts.receiver),
            sender: parts.sender,
            stopper: parts.stopper,
            fixup: parts.fixup,
            ingress: parts.ingress,
            egress: parts.egress,
            config: parts.config,
            lifecycle: parts.lifecycle,
            data: Arc::new(parts.data),
            span,
            stopped: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            done,
            signal_tx,
            signal_rx: Mutex::new(signal_rx),
            created_at: now,
            last_activity: RwLock::new(now),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Application data shared with every handler of this session
    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Context handed to ingress and egress handlers
    pub fn context(&self) -> Context {
        let ctx = Context::new()
            .with_span(self.span.clone())
            .with_data(self.data.clone());
        match self.this.upgrade() {
            Some(this) => ctx.with_peer(this),
            None => ctx,
        }
    }

    /// Run the connect hooks once. Called implicitly by `listen` and
    /// `ping_pong`.
    pub async fn init(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.is_stop() {
            return Err(SessionError::Closed);
        }

        if let Some(this) = self.this.upgrade() {
            self.lifecycle.connect(&this).await?;
        }
        self.initialized.store(true, Ordering::Release);
        debug!(parent: &self.span, "session initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Receive and dispatch messages until the session stops.
    ///
    /// Ingress handler errors are logged and do not end the loop. A receive
    /// error ends it: with a fixup configured the transport is repaired and
    /// listening resumes, otherwise the session stops and the error is
    /// returned.
    pub async fn listen(&self) -> Result<()> {
        self.init().await?;
        let result = match &self.fixup {
            Some(fixup) => {
                let this = self;
                task::reliable_task_with_fixup(
                    move || this.listen_loop(),
                    move || async move { fixup.fixup().await.map_err(SessionError::from) },
                    move || this.is_stop(),
                    &self.config.effective_retry(),
                )
                .instrument(self.span.clone())
                .await
            }
            None => self.listen_loop().instrument(self.span.clone()).await,
        };
        self.finish("listen", result).await
    }

    async fn listen_loop(&self) -> Result<()> {
        let mut receiver = self.receiver.lock().await;
        loop {
            if self.is_stop() {
                return Ok(());
            }
            let mut msg = match receiver.recv().await {
                Ok(msg) => msg,
                Err(_) if self.is_stop() => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            self.touch();

            let Some(ingress) = &self.ingress else {
                debug!("no ingress router, dropping {}", msg.subject);
                continue;
            };
            let ctx = self.context();
            if let Err(e) = ingress.handle_message(&mut msg, &ctx).await {
                warn!("ingress {} failed: {}", msg.subject, e);
            }
        }
    }

    /// Send a message through the egress router, or straight to the
    /// transport when there is none.
    ///
    /// Sending does not trigger initialization, so connect hooks may send.
    pub async fn send(&self, mut msg: Message) -> Result<()> {
        if self.is_stop() {
            return Err(SessionError::Closed);
        }
        match &self.egress {
            Some(egress) => {
                let ctx = self.context();
                egress.handle_message(&mut msg, &ctx).await?;
                Ok(())
            }
            None => self.raw_send(msg).await,
        }
    }

    /// Send straight to the transport
    pub async fn raw_send(&self, msg: Message) -> Result<()> {
        if self.is_stop() {
            return Err(SessionError::Closed);
        }
        self.sender.send(msg).await?;
        self.touch();
        Ok(())
    }

    /// Stop the session.
    ///
    /// The first call releases the transport, runs the disconnect hooks and
    /// wakes [`wait_stop`](Self::wait_stop) waiters. Later calls return
    /// [`SessionError::Closed`] and do nothing.
    pub async fn stop(&self) -> Result<()> {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Closed);
        }
        info!(parent: &self.span, "stopping session");

        if let Err(e) = self.stopper.stop().await {
            warn!(parent: &self.span, "transport stop failed: {}", e);
        }
        if let Some(this) = self.this.upgrade() {
            self.lifecycle.disconnect(&this).await;
        }
        self.done.send_replace(true);
        Ok(())
    }

    /// True from the moment `stop` is first called
    pub fn is_stop(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Resolve once `stop` has finished its teardown
    pub async fn wait_stop(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    /// Run ping-pong as configured until the session stops.
    ///
    /// Failures go through the fixup like the listen loop; what happens
    /// when they persist is decided by
    /// [`SessionConfig::on_ping_pong_failure`].
    pub async fn ping_pong(&self) -> Result<()> {
        let Some(cfg) = self.config.ping_pong.clone() else {
            return Err(SessionError::Config("ping-pong is not configured".into()));
        };
        self.init().await?;

        let this = self;
        let cfg = &cfg;
        let run = move || async move {
            let mut signals = this.signal_rx.lock().await;
            let wait = cfg.wait();
            match cfg.role {
                PingPongRole::Initiator => {
                    pingpong::send_ping_wait_pong(
                        move || this.raw_send(Message::new(cfg.ping_subject.clone())),
                        &mut signals,
                        move || this.is_stop(),
                        wait,
                    )
                    .await
                }
                PingPongRole::Responder => {
                    pingpong::wait_ping_send_pong(
                        &mut signals,
                        move || this.raw_send(Message::new(cfg.pong_subject.clone())),
                        move || this.is_stop(),
                        wait,
                    )
                    .await
                }
            }
        };

        let result = match &self.fixup {
            Some(fixup) => {
                task::reliable_task_with_fixup(
                    run,
                    move || async move { fixup.fixup().await.map_err(SessionError::from) },
                    move || this.is_stop(),
                    &self.config.effective_retry(),
                )
                .instrument(self.span.clone())
                .await
            }
            None => run().instrument(self.span.clone()).await,
        };

        match result {
            Err(e) if !self.is_stop() && self.config.on_ping_pong_failure == FailurePolicy::Discard => {
                warn!(parent: &self.span, "ping-pong failed, session kept alive: {}", e);
                Ok(())
            }
            other => self.finish("ping-pong", other).await,
        }
    }

    /// Stop on failure; errors caused by our own stop are not errors
    async fn finish(&self, what: &str, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(_) if self.is_stop() => Ok(()),
            Err(e) => {
                warn!(parent: &self.span, "{} failed, stopping session: {}", what, e);
                let _ = self.stop().await;
                Err(e)
            }
        }
    }

    /// Run [`listen`](Self::listen) on a background task
    pub fn spawn_listen(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let this = self.clone();
        tokio::spawn(async move { this.listen().await })
    }

    /// Run [`ping_pong`](Self::ping_pong) on a background task
    pub fn spawn_ping_pong(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let this = self.clone();
        tokio::spawn(async move { this.ping_pong().await })
    }

    /// Feed one received ping or pong into the liveness loop
    pub fn notify_ping_pong(&self) {
        // A full channel already holds an undelivered signal.
        let _ = self.signal_tx.try_send(Ok(()));
    }

    /// Abort the liveness loop with `err`
    pub fn fail_ping_pong(&self, err: SessionError) {
        let _ = self.signal_tx.try_send(Err(err));
    }

    /// Check if the transport reports a live connection
    pub fn is_connected(&self) -> bool {
        !self.is_stop() && self.sender.is_connected()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Touch to update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Get idle duration
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

#[async_trait]
impl Peer for Session {
    fn id(&self) -> &str {
        Session::id(self)
    }

    fn is_stopped(&self) -> bool {
        self.is_stop()
    }

    async fn send(&self, msg: Message) -> courier_core::Result<()> {
        Session::send(self, msg).await.map_err(Into::into)
    }

    async fn raw_send(&self, msg: Message) -> courier_core::Result<()> {
        Session::raw_send(self, msg).await.map_err(Into::into)
    }

    fn notify_ping_pong(&self) {
        Session::notify_ping_pong(self)
    }

    async fn stop(&self) -> courier_core::Result<()> {
        Session::stop(self).await.map_err(Into::into)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("stopped", &self.is_stop())
            .field("initialized", &self.is_initialized())
            .field("fixup", &self.fixup.is_some())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Egress handler that hands the message to the session's transport
///
/// Use it as the final handler of an egress router:
///
/// ```
/// use courier_mux::Mux;
/// use courier_session::session::egress_sink;
///
/// let mut egress = Mux::new();
/// egress.default_handler(egress_sink());
/// ```
pub fn egress_sink() -> HandleFunc {
    handler_fn(|msg, ctx| {
        Box::pin(async move {
            match ctx.peer() {
                Some(peer) => peer.raw_send(std::mem::take(msg)).await,
                None => Err(courier_core::Error::Config(
                    "egress dispatch without a session".into(),
                )),
            }
        })
    })
}
