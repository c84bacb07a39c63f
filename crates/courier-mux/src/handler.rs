//! Handler and middleware types

use courier_core::{Context, Error, Message, Result};
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::mux::Mux;
use crate::trie::Node;

/// A message handler
pub type HandleFunc =
    Arc<dyn for<'a> Fn(&'a mut Message, &'a Context) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// A middleware: runs around the rest of the chain, reached through [`Next`]
pub type Middleware = Arc<
    dyn for<'a> Fn(&'a mut Message, &'a Context, Next<'a>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
>;

/// Computes the routing subject of a message
pub type SubjectFn = Arc<dyn Fn(&Message) -> String + Send + Sync>;

/// Observes dispatch errors; the error itself is still returned to the caller
pub type ErrorHandler = Arc<dyn Fn(&Message, &Context, &Error) + Send + Sync>;

/// Build a [`HandleFunc`] from a closure
///
/// ```
/// use courier_mux::handler_fn;
///
/// let h = handler_fn(|msg, _ctx| Box::pin(async move {
///     msg.metadata.set("seen", true);
///     Ok(())
/// }));
/// # let _ = h;
/// ```
pub fn handler_fn<F>(f: F) -> HandleFunc
where
    F: for<'a> Fn(&'a mut Message, &'a Context) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Build a [`Middleware`] from a closure
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: for<'a> Fn(&'a mut Message, &'a Context, Next<'a>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Build a [`SubjectFn`] from a closure
pub fn subject_fn<F>(f: F) -> SubjectFn
where
    F: Fn(&Message) -> String + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What sits at the center of a middleware chain
#[derive(Clone, Copy)]
pub(crate) enum Endpoint<'a> {
    Handler(&'a HandleFunc),
    /// Run the node's transforms, recompute the subject and match again
    /// from that node
    Transform { mux: &'a Mux, node: &'a Node },
}

impl<'a> Endpoint<'a> {
    fn call<'b>(self, msg: &'b mut Message, ctx: &'b Context) -> BoxFuture<'b, Result<()>>
    where
        'a: 'b,
    {
        match self {
            Endpoint::Handler(handler) => handler(msg, ctx),
            Endpoint::Transform { mux, node } => Box::pin(async move {
                for transform in node.transforms() {
                    transform(&mut *msg, ctx).await?;
                }
                let subject = match node.subject_fn() {
                    Some(f) => f(msg),
                    None => mux.subject_of(msg),
                };
                mux.dispatch_from(node, subject, msg, ctx, true).await
            }),
        }
    }
}

/// The remainder of a middleware chain
///
/// `Next` is `Copy`: a middleware may run the rest of the chain more than
/// once (see [`retry`](crate::middleware::retry)) or not at all.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [&'a Middleware],
    endpoint: Endpoint<'a>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [&'a Middleware], endpoint: Endpoint<'a>) -> Self {
        Self { chain, endpoint }
    }

    /// Run the rest of the chain
    pub fn run<'b>(self, msg: &'b mut Message, ctx: &'b Context) -> BoxFuture<'b, Result<()>>
    where
        'a: 'b,
    {
        match self.chain.split_first() {
            Some((middleware, rest)) => middleware(
                msg,
                ctx,
                Next {
                    chain: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(msg, ctx),
        }
    }

    /// Number of middlewares left before the endpoint
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

/// Wrap `handler` in `middlewares`, first one outermost
pub fn link(handler: HandleFunc, middlewares: Vec<Middleware>) -> HandleFunc {
    if middlewares.is_empty() {
        return handler;
    }
    let middlewares: Arc<[Middleware]> = middlewares.into();
    handler_fn(move |msg, ctx| {
        let handler = handler.clone();
        let middlewares = middlewares.clone();
        Box::pin(async move {
            let chain: Vec<&Middleware> = middlewares.iter().collect();
            Next::new(&chain, Endpoint::Handler(&handler))
                .run(msg, ctx)
                .await
        })
    })
}
