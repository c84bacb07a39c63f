//! Session and hub configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SessionError};

/// Session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Budget for repairing a broken transport (seconds, 0 = until stopped)
    pub fixup_max_retry_secs: u64,
    /// Liveness checking; `None` disables ping-pong
    pub ping_pong: Option<PingPongConfig>,
    /// What a failed ping-pong does to the session
    pub on_ping_pong_failure: FailurePolicy,
    /// Backoff used while retrying the listen loop, ping-pong or fixup
    pub retry: RetryPolicy,
}

impl SessionConfig {
    /// Retry policy with the fixup budget applied
    pub fn effective_retry(&self) -> RetryPolicy {
        let mut policy = self.retry.clone();
        if self.fixup_max_retry_secs > 0 {
            policy.max_elapsed_secs = self.fixup_max_retry_secs;
        }
        policy
    }
}

/// Side of the ping-pong exchange a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingPongRole {
    /// Sends pings and expects pongs
    #[default]
    Initiator,
    /// Expects pings and answers with pongs
    Responder,
}

/// Ping-pong configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PingPongConfig {
    pub role: PingPongRole,
    /// Silence tolerated before the peer is considered dead (seconds)
    pub wait_secs: u64,
    /// Overrides `wait_secs` with millisecond precision
    pub wait_millis: Option<u64>,
    /// Subject of outgoing pings
    pub ping_subject: String,
    /// Subject of outgoing pongs
    pub pong_subject: String,
}

impl PingPongConfig {
    pub fn initiator(wait: Duration) -> Self {
        Self::default().with_wait(wait)
    }

    pub fn responder(wait: Duration) -> Self {
        Self {
            role: PingPongRole::Responder,
            ..Self::default()
        }
        .with_wait(wait)
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait_secs = wait.as_secs();
        self.wait_millis = Some(wait.as_millis() as u64);
        self
    }

    /// Effective wait window
    pub fn wait(&self) -> Duration {
        match self.wait_millis {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.wait_secs),
        }
    }
}

impl Default for PingPongConfig {
    fn default() -> Self {
        Self {
            role: PingPongRole::Initiator,
            wait_secs: 30,
            wait_millis: None,
            ping_subject: "ping".to_string(),
            pong_subject: "pong".to_string(),
        }
    }
}

/// How a background failure is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the session and return the error
    #[default]
    Propagate,
    /// Log the error and leave the session running
    Discard,
}

/// Exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    /// Each delay is drawn from `interval * (1 ± randomization_factor)`
    pub randomization_factor: f64,
    pub max_interval_ms: u64,
    /// Give up after this long (seconds, 0 = until stopped)
    pub max_elapsed_secs: u64,
}

impl RetryPolicy {
    /// Policy with fixed small delays, for tests and in-process transports
    pub fn fast(interval: Duration) -> Self {
        let ms = interval.as_millis() as u64;
        Self {
            initial_interval_ms: ms,
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_interval_ms: ms,
            max_elapsed_secs: 0,
        }
    }

    pub fn with_max_elapsed(mut self, secs: u64) -> Self {
        self.max_elapsed_secs = secs;
        self
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// `None` when retries are unbounded
    pub fn max_elapsed(&self) -> Option<Duration> {
        (self.max_elapsed_secs > 0).then(|| Duration::from_secs(self.max_elapsed_secs))
    }

    /// Reject parameters that would make the backoff shrink or misbehave
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(invalid(format!(
                "multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(invalid(format!(
                "randomization_factor must be within [0, 1], got {}",
                self.randomization_factor
            )));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(invalid(format!(
                "max_interval_ms ({}) is below initial_interval_ms ({})",
                self.max_interval_ms, self.initial_interval_ms
            )));
        }
        Ok(())
    }
}

fn invalid(msg: String) -> SessionError {
    SessionError::Config(format!("retry policy: {}", msg))
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 10_000,
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval_ms: 60_000,
            max_elapsed_secs: 0,
        }
    }
}

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hub name, used in logs
    pub name: String,
    /// Tasks running at once in `do_async` and `broadcast` (0 = unbounded)
    pub concurrency_limit: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: "hub".to_string(),
            concurrency_limit: 0,
        }
    }
}
