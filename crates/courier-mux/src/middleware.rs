//! Built-in middlewares

use courier_core::Error;
use courier_core::Message;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn, Instrument};

use crate::handler::{middleware_fn, Middleware};

/// Turn a panic anywhere further down the chain into [`Error::Panic`]
pub fn recover() -> Middleware {
    middleware_fn(|msg, ctx, next| {
        Box::pin(async move {
            let subject = msg.subject.clone();
            match AssertUnwindSafe(async move { next.run(msg, ctx).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!(subject = %subject, reason = %reason, "handler panicked");
                    Err(Error::Panic(reason))
                }
            }
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Log every dispatch inside the context's span
pub fn logger() -> Middleware {
    middleware_fn(|msg, ctx, next| {
        let span = ctx.span().clone();
        Box::pin(
            async move {
                let subject = msg.subject.clone();
                let start = Instant::now();
                debug!(subject = %subject, "dispatch");
                let result = next.run(msg, ctx).await;
                match &result {
                    Ok(()) => debug!(subject = %subject, elapsed = ?start.elapsed(), "done"),
                    Err(e) => warn!(subject = %subject, elapsed = ?start.elapsed(), error = %e, "failed"),
                }
                result
            }
            .instrument(span),
        )
    })
}

/// Warn when the rest of the chain takes longer than `threshold`
pub fn timing(threshold: Duration) -> Middleware {
    middleware_fn(move |msg, ctx, next| {
        Box::pin(async move {
            let start = Instant::now();
            let result = next.run(&mut *msg, ctx).await;
            let elapsed = start.elapsed();
            if elapsed > threshold {
                warn!(subject = %msg.subject, ?elapsed, ?threshold, "slow handler");
            }
            result
        })
    })
}

/// Run the rest of the chain again, up to `max_retries` more times, while it
/// fails. Rejections and panics are not retried.
pub fn retry(max_retries: usize) -> Middleware {
    middleware_fn(move |msg, ctx, next| {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match next.run(&mut *msg, ctx).await {
                    Ok(()) => return Ok(()),
                    Err(e @ (Error::Rejected(_) | Error::Panic(_))) => return Err(e),
                    Err(e) if attempt >= max_retries => return Err(e),
                    Err(e) => {
                        attempt += 1;
                        debug!(subject = %msg.subject, attempt, error = %e, "retrying");
                    }
                }
            }
        })
    })
}

/// Reject messages for which `pred` returns false
pub fn filter<F>(pred: F) -> Middleware
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    middleware_fn(move |msg, ctx, next| {
        let accepted = pred(&*msg);
        Box::pin(async move {
            if !accepted {
                return Err(Error::Rejected(msg.subject.clone()));
            }
            next.run(msg, ctx).await
        })
    })
}

/// Stop the chain, successfully, for the listed subjects
pub fn exclude_subjects<I, S>(subjects: I) -> Middleware
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let excluded: Arc<HashSet<String>> = Arc::new(subjects.into_iter().map(Into::into).collect());
    middleware_fn(move |msg, ctx, next| {
        let skip = excluded.contains(&msg.subject);
        Box::pin(async move {
            if skip {
                return Ok(());
            }
            next.run(msg, ctx).await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handler_fn, Mux};
    use courier_core::Context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_recover_converts_panic() {
        let mut mux = Mux::new();
        mux.middleware([recover()]);
        mux.handler(
            "boom",
            handler_fn(|msg, _ctx| {
                Box::pin(async move {
                    if msg.subject == "boom" {
                        panic!("kaboom");
                    }
                    Ok(())
                })
            }),
        );

        let err = mux
            .handle_message(&mut Message::new("boom"), &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Panic(reason) if reason == "kaboom"));
    }

    #[tokio::test]
    async fn test_retry_reruns_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut mux = Mux::new();
        mux.middleware([retry(2)]);
        mux.handler(
            "flaky",
            handler_fn(move |_msg, _ctx| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n < 2 {
                        Err(Error::handler("not yet"))
                    } else {
                        Ok(())
                    }
                })
            }),
        );

        mux.handle_message(&mut Message::new("flaky"), &Context::new())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut mux = Mux::new();
        mux.middleware([retry(1)]);
        mux.handler(
            "broken",
            handler_fn(move |_msg, _ctx| {
                seen.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Err::<(), _>(Error::handler("always")) })
            }),
        );

        let result = mux
            .handle_message(&mut Message::new("broken"), &Context::new())
            .await;
        assert!(matches!(result, Err(Error::Handler(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timing_passes_results_through() {
        let mut mux = Mux::new();
        mux.middleware([timing(Duration::ZERO)]);
        mux.handler(
            "slow",
            handler_fn(|msg, _ctx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    msg.subject = "slow/done".to_string();
                    Ok(())
                })
            }),
        );
        mux.handler(
            "bad",
            handler_fn(|_msg, _ctx| Box::pin(async { Err::<(), _>(Error::Rejected("bad".into())) })),
        );

        let ctx = Context::new();
        let mut msg = Message::new("slow");
        mux.handle_message(&mut msg, &ctx).await.unwrap();
        assert_eq!(msg.subject, "slow/done");

        let err = mux
            .handle_message(&mut Message::new("bad"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rejected(subject) if subject == "bad"));
    }

    #[tokio::test]
    async fn test_filter_and_exclude() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut mux = Mux::new();
        mux.middleware([
            exclude_subjects(["health"]),
            filter(|msg: &Message| !msg.bytes.is_empty() || msg.subject == "health"),
        ]);
        let handler = handler_fn(move |_msg, _ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        });
        mux.handler("health", handler.clone());
        mux.handler("data", handler);

        let ctx = Context::new();
        mux.handle_message(&mut Message::new("health"), &ctx)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let err = mux
            .handle_message(&mut Message::new("data"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));

        mux.handle_message(&mut Message::new("data").with_bytes("x"), &ctx)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
