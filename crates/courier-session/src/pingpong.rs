//! Ping-pong liveness
//!
//! Two roles share one contract: the side that sends pings gives up when no
//! pong arrived for `wait`; the side that answers gives up when no ping
//! arrived for `wait`. Incoming pings and pongs are delivered through a
//! signal channel fed by whoever receives them (usually an ingress handler
//! calling [`Peer::notify_ping_pong`](courier_core::Peer::notify_ping_pong)).
//!
//! Both loops poll `is_stop` on every wake-up and return `Ok` once it holds.

use courier_mux::{handler_fn, HandleFunc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{Result, SessionError};

/// One liveness event: `Ok` for a ping or pong, `Err` to abort the loop
pub type Signal = Result<()>;

/// Send a ping every `wait / 2` and fail when no pong arrives within `wait`.
///
/// The ping ticker and the pong watchdog run side by side; whichever ends
/// first decides the result.
pub async fn send_ping_wait_pong<P, PFut, S>(
    mut send_ping: P,
    pongs: &mut mpsc::Receiver<Signal>,
    is_stop: S,
    wait: Duration,
) -> Result<()>
where
    P: FnMut() -> PFut,
    PFut: Future<Output = Result<()>>,
    S: Fn() -> bool,
{
    let period = (wait / 2).max(Duration::from_millis(1));
    let is_stop = &is_stop;

    let ticker = async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if is_stop() {
                return Ok(());
            }
            trace!("sending ping");
            if let Err(e) = send_ping().await {
                return Err(e);
            }
        }
    };

    let watchdog = async move {
        loop {
            if is_stop() {
                return Ok(());
            }
            match timeout(wait, pongs.recv()).await {
                Ok(Some(Ok(()))) => trace!("pong received"),
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) if is_stop() => return Ok(()),
                Ok(None) => return Err(SessionError::SignalClosed),
                Err(_) if is_stop() => return Ok(()),
                Err(_) => {
                    debug!("no pong within {:?}", wait);
                    return Err(SessionError::PongTimeout(wait));
                }
            }
        }
    };

    tokio::select! {
        result = ticker => result,
        result = watchdog => result,
    }
}

/// Answer every ping with `send_pong` and fail when no ping arrives within
/// `wait`.
pub async fn wait_ping_send_pong<P, PFut, S>(
    pings: &mut mpsc::Receiver<Signal>,
    mut send_pong: P,
    is_stop: S,
    wait: Duration,
) -> Result<()>
where
    P: FnMut() -> PFut,
    PFut: Future<Output = Result<()>>,
    S: Fn() -> bool,
{
    loop {
        if is_stop() {
            return Ok(());
        }
        match timeout(wait, pings.recv()).await {
            Ok(Some(Ok(()))) => {
                if is_stop() {
                    return Ok(());
                }
                trace!("ping received, sending pong");
                send_pong().await?;
            }
            Ok(Some(Err(e))) => return Err(e),
            Ok(None) if is_stop() => return Ok(()),
            Ok(None) => return Err(SessionError::SignalClosed),
            Err(_) if is_stop() => return Ok(()),
            Err(_) => {
                debug!("no ping within {:?}", wait);
                return Err(SessionError::PingTimeout(wait));
            }
        }
    }
}

/// Ingress handler feeding the receiving session's liveness signal
///
/// Register it for the ping and pong subjects:
///
/// ```
/// use courier_mux::Mux;
/// use courier_session::pingpong::notify_handler;
///
/// let mut ingress = Mux::new();
/// ingress.handler("ping", notify_handler());
/// ingress.handler("pong", notify_handler());
/// ```
pub fn notify_handler() -> HandleFunc {
    handler_fn(|_msg, ctx| {
        if let Some(peer) = ctx.peer() {
            peer.notify_ping_pong();
        }
        Box::pin(async { Ok(()) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_responder_times_out_without_pings() {
        let (_tx, mut rx) = mpsc::channel(4);
        let result = wait_ping_send_pong(
            &mut rx,
            || async { Ok(()) },
            || false,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(SessionError::PingTimeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_runs_until_stopped() {
        let (tx, mut rx) = mpsc::channel(4);
        let pongs = Arc::new(AtomicU32::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let feeder = {
            let stop = stop.clone();
            tokio::spawn(async move {
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    tx.send(Ok(())).await.unwrap();
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                stop.store(true, Ordering::SeqCst);
                tx
            })
        };

        let counter = pongs.clone();
        let flag = stop.clone();
        let result = wait_ping_send_pong(
            &mut rx,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            move || flag.load(Ordering::SeqCst),
            Duration::from_secs(1),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(pongs.load(Ordering::SeqCst), 5);
        drop(feeder.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initiator_times_out_without_pongs() {
        let (_tx, mut rx) = mpsc::channel(4);
        let pings = Arc::new(AtomicU32::new(0));
        let counter = pings.clone();

        let result = send_ping_wait_pong(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            &mut rx,
            || false,
            Duration::from_secs(2),
        )
        .await;

        assert!(matches!(result, Err(SessionError::PongTimeout(_))));
        assert!(pings.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initiator_fails_on_send_error() {
        let (tx, mut rx) = mpsc::channel(4);
        let result = send_ping_wait_pong(
            || async { Err(SessionError::Closed) },
            &mut rx,
            || false,
            Duration::from_secs(2),
        )
        .await;
        assert!(matches!(result, Err(SessionError::Closed)));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_error_aborts() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(Err(SessionError::Config("peer reset".into())))
            .await
            .unwrap();
        let result = wait_ping_send_pong(
            &mut rx,
            || async { Ok(()) },
            || false,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}
