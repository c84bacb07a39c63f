//! Reliable task runner
//!
//! [`reliable_task`] keeps a fallible task alive. When the task fails it is
//! either retried directly after a backoff delay, or, when a fixup is given,
//! the fixup is retried until it succeeds and the task then starts over:
//!
//! ```text
//!   RunTask --err--> RunFixup --ok--> RunTask
//!                      |  ^
//!                      +--+ err, after backoff
//! ```
//!
//! The stop predicate is consulted before every retry. An attempt already in
//! flight is never interrupted.

use futures::future::Ready;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RetryPolicy;

/// Exponential backoff state for one retry sequence
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    started: Instant,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            current: policy.initial_interval(),
            started: Instant::now(),
            policy,
        }
    }

    /// Delay before the next attempt, or `None` once the elapsed-time budget
    /// is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.randomized(self.current);
        if let Some(max) = self.policy.max_elapsed() {
            if self.started.elapsed() + delay > max {
                return None;
            }
        }

        let max = self.policy.max_interval();
        let grown = self.current.as_secs_f64() * self.policy.multiplier;
        self.current = Duration::try_from_secs_f64(grown)
            .unwrap_or(max)
            .clamp(self.current.min(max), max);
        Some(delay)
    }

    /// Start a new sequence from the initial interval
    pub fn reset(&mut self) {
        self.current = self.policy.initial_interval();
        self.started = Instant::now();
    }

    fn randomized(&self, interval: Duration) -> Duration {
        let factor = self.policy.randomization_factor;
        if factor.is_nan() || factor <= 0.0 {
            return interval;
        }
        let base = interval.as_secs_f64();
        let delta = base * factor.min(1.0);
        if delta <= 0.0 {
            return interval;
        }
        let secs = rand::thread_rng().gen_range((base - delta)..=(base + delta));
        Duration::try_from_secs_f64(secs).unwrap_or(interval)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RunTask,
    RunFixup,
}

/// Run `task`, retrying it with backoff until it succeeds, `allow_stop`
/// returns true, or the policy's time budget runs out. The last error is
/// returned when retrying is abandoned.
pub async fn reliable_task<T, Fut, E, S>(task: T, allow_stop: S, policy: &RetryPolicy) -> Result<(), E>
where
    T: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
    S: Fn() -> bool,
{
    run(task, None::<fn() -> Ready<Result<(), E>>>, allow_stop, policy).await
}

/// Run `task`; whenever it fails, retry `fixup` with backoff until it
/// succeeds, then run `task` again from the start.
///
/// The first fixup attempt follows the failure immediately.
pub async fn reliable_task_with_fixup<T, Fut, F, FFut, E, S>(
    task: T,
    fixup: F,
    allow_stop: S,
    policy: &RetryPolicy,
) -> Result<(), E>
where
    T: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    F: FnMut() -> FFut,
    FFut: Future<Output = Result<(), E>>,
    E: Display,
    S: Fn() -> bool,
{
    run(task, Some(fixup), allow_stop, policy).await
}

async fn run<T, Fut, F, FFut, E, S>(
    mut task: T,
    mut fixup: Option<F>,
    allow_stop: S,
    policy: &RetryPolicy,
) -> Result<(), E>
where
    T: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    F: FnMut() -> FFut,
    FFut: Future<Output = Result<(), E>>,
    E: Display,
    S: Fn() -> bool,
{
    let mut backoff = Backoff::new(policy.clone());
    let mut phase = Phase::RunTask;
    let mut fixup_attempts = 0u32;

    loop {
        let result = match (phase, fixup.as_mut()) {
            (Phase::RunFixup, Some(fixup)) => fixup().await,
            _ => task().await,
        };

        let err = match result {
            Ok(()) if phase == Phase::RunTask => return Ok(()),
            Ok(()) => {
                debug!("fixup succeeded after {} attempt(s), resuming task", fixup_attempts);
                phase = Phase::RunTask;
                continue;
            }
            Err(e) => e,
        };

        if allow_stop() {
            debug!("stop requested, abandoning retries: {}", err);
            return Err(err);
        }

        match phase {
            Phase::RunTask if fixup.is_some() => {
                warn!("task failed, starting fixup: {}", err);
                phase = Phase::RunFixup;
                fixup_attempts = 1;
                backoff.reset();
                continue;
            }
            Phase::RunTask => warn!("task failed: {}", err),
            Phase::RunFixup => {
                fixup_attempts += 1;
                warn!("fixup attempt failed: {}", err);
            }
        }

        let Some(delay) = backoff.next_delay() else {
            warn!("retry budget exhausted: {}", err);
            return Err(err);
        };
        tokio::time::sleep(delay).await;

        if allow_stop() {
            return Err(err);
        }
    }
}
