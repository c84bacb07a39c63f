//! Session hub
//!
//! A [`Hub`] tracks live members by key. At most one member occupies a key:
//! joining an occupied key stops the previous occupant first. Members leave
//! the hub on their own when they stop.
//!
//! Shutdown is one-shot. It stops every member, and every later join fails
//! with [`SessionError::Closed`].

use async_trait::async_trait;
use courier_core::Message;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{Result, SessionError};
use crate::session::Session;

/// Something a [`Hub`] can hold
#[async_trait]
pub trait Member: Send + Sync + 'static {
    /// Hub key
    fn key(&self) -> &str;

    fn is_stopped(&self) -> bool;

    /// Stop the member; a repeated stop returns a closed error
    async fn stop(&self) -> Result<()>;

    /// Resolve once the member has fully stopped
    async fn wait_stop(&self);
}

#[async_trait]
impl Member for Session {
    fn key(&self) -> &str {
        self.id()
    }

    fn is_stopped(&self) -> bool {
        self.is_stop()
    }

    async fn stop(&self) -> Result<()> {
        Session::stop(self).await
    }

    async fn wait_stop(&self) {
        Session::wait_stop(self).await
    }
}

/// Concurrent registry of members
pub struct Hub<A: Member> {
    config: HubConfig,
    members: Arc<DashMap<String, Arc<A>>>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl<A: Member> Hub<A> {
    pub fn new(config: HubConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            members: Arc::new(DashMap::new()),
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Install `member` under its key, stopping whoever held the key before.
    ///
    /// Must be called from within a tokio runtime: a watcher task removes the
    /// member from the hub once it stops.
    pub async fn join(&self, member: Arc<A>) -> Result<()> {
        if self.is_shutdown() {
            return Err(SessionError::Closed);
        }
        let key = member.key().to_string();

        loop {
            // The shard lock is released before awaiting the old member.
            let previous = match self.members.entry(key.clone()) {
                Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), &member) => return Ok(()),
                Entry::Occupied(entry) => Some(entry.remove()),
                Entry::Vacant(entry) => {
                    entry.insert(member.clone());
                    None
                }
            };
            let Some(previous) = previous else {
                break;
            };

            info!("{}: evicting previous member {}", self.config.name, key);
            if let Err(e) = previous.stop().await {
                if !e.is_closed() {
                    warn!("{}: stopping evicted member {} failed: {}", self.config.name, key, e);
                }
            }
            previous.wait_stop().await;
        }

        if self.is_shutdown() {
            self.members
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &member));
            let _ = member.stop().await;
            return Err(SessionError::Closed);
        }

        let members = Arc::clone(&self.members);
        let watched = member.clone();
        let name = self.config.name.clone();
        tokio::spawn(async move {
            watched.wait_stop().await;
            let key = watched.key().to_string();
            if members
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &watched))
                .is_some()
            {
                debug!("{}: member {} left", name, key);
            }
        });

        debug!("{}: member {} joined", self.config.name, key);
        Ok(())
    }

    pub fn find_by_key(&self, key: &str) -> Option<Arc<A>> {
        self.members.get(key).map(|entry| entry.value().clone())
    }

    /// First member matching `filter`
    pub fn find_one<F>(&self, filter: F) -> Option<Arc<A>>
    where
        F: Fn(&A) -> bool,
    {
        self.members
            .iter()
            .find(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Every member matching `filter`
    pub fn find_multi<F>(&self, filter: F) -> Vec<Arc<A>>
    where
        F: Fn(&A) -> bool,
    {
        self.members
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Stop and remove the member under `key`
    pub async fn remove_by_key(&self, key: &str) -> Option<Arc<A>> {
        let (_, member) = self.members.remove(key)?;
        stop_quietly(&*member, &self.config.name).await;
        Some(member)
    }

    /// Stop and remove the first member matching `filter`
    pub async fn remove_one<F>(&self, filter: F) -> Option<Arc<A>>
    where
        F: Fn(&A) -> bool,
    {
        let member = self.find_one(filter)?;
        self.evict(&member).then_some(())?;
        stop_quietly(&*member, &self.config.name).await;
        Some(member)
    }

    /// Stop and remove every member matching `filter`
    pub async fn remove_multi<F>(&self, filter: F) -> Vec<Arc<A>>
    where
        F: Fn(&A) -> bool,
    {
        let removed: Vec<Arc<A>> = self
            .find_multi(filter)
            .into_iter()
            .filter(|member| self.evict(member))
            .collect();
        join_all(
            removed
                .iter()
                .map(|member| stop_quietly(&**member, &self.config.name)),
        )
        .await;
        removed
    }

    /// Remove `member` if it still occupies its key
    fn evict(&self, member: &Arc<A>) -> bool {
        self.members
            .remove_if(member.key(), |_, current| Arc::ptr_eq(current, member))
            .is_some()
    }

    /// Call `action` for every member until it breaks
    pub fn do_sync<F>(&self, mut action: F)
    where
        F: FnMut(&Arc<A>) -> ControlFlow<()>,
    {
        for member in self.snapshot() {
            if action(&member).is_break() {
                break;
            }
        }
    }

    /// Run `action` for every member on its own task and wait for all of
    /// them; at most `concurrency_limit` run at once
    pub async fn do_async<F, Fut>(&self, action: F)
    where
        F: Fn(Arc<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action = Arc::new(action);
        let gate = match self.config.concurrency_limit {
            0 => None,
            limit => Some(Arc::new(Semaphore::new(limit))),
        };

        let mut tasks = Vec::new();
        for member in self.snapshot() {
            let permit = match &gate {
                Some(gate) => Arc::clone(gate).acquire_owned().await.ok(),
                None => None,
            };
            let action = Arc::clone(&action);
            tasks.push(tokio::spawn(async move {
                action(member).await;
                drop(permit);
            }));
        }

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("{}: member task failed: {}", self.config.name, e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.members.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Stop every member and refuse further joins.
    ///
    /// Returns [`SessionError::Closed`] when the hub was already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        info!("{}: shutting down with {} member(s)", self.config.name, self.len());

        loop {
            let drained: Vec<Arc<A>> = self
                .keys()
                .iter()
                .filter_map(|key| self.members.remove(key).map(|(_, member)| member))
                .collect();
            if drained.is_empty() {
                break;
            }
            join_all(
                drained
                    .iter()
                    .map(|member| stop_quietly(&**member, &self.config.name)),
            )
            .await;
        }

        self.shutdown.send_replace(true);
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolve once `shutdown` has stopped every member
    pub async fn wait_shutdown(&self) {
        let mut done = self.shutdown.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    fn snapshot(&self) -> Vec<Arc<A>> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Hub<Session> {
    /// Send a copy of `msg` to every session; returns how many sends
    /// succeeded
    pub async fn broadcast(&self, msg: Message) -> usize {
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        let msg = Arc::new(msg);
        let name = self.config.name.clone();

        self.do_async(move |session| {
            let counter = Arc::clone(&counter);
            let msg = Message::clone(&msg);
            let name = name.clone();
            async move {
                match session.send(msg).await {
                    Ok(()) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => debug!("{}: broadcast to {} failed: {}", name, session.id(), e),
                }
            }
        })
        .await;

        delivered.load(Ordering::Relaxed)
    }
}

impl<A: Member> Default for Hub<A> {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl<A: Member> std::fmt::Debug for Hub<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("name", &self.config.name)
            .field("members", &self.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

async fn stop_quietly<A: Member + ?Sized>(member: &A, hub: &str) {
    if let Err(e) = member.stop().await {
        if !e.is_closed() {
            warn!("{}: stopping member {} failed: {}", hub, member.key(), e);
        }
    }
}
