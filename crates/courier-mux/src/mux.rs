//! The subject router
//!
//! A [`Mux`] is built once at startup and is read-only afterwards, so a
//! single instance behind an `Arc` serves any number of concurrent sessions
//! without locking.
//!
//! # Example
//!
//! ```
//! use courier_core::{Context, Message};
//! use courier_mux::{handler_fn, Mux};
//!
//! # async fn example() -> courier_core::Result<()> {
//! let mut mux = Mux::new();
//! mux.handler("dev/book/{book_id}", handler_fn(|msg, _ctx| Box::pin(async move {
//!     assert_eq!(msg.route_params.get("book_id"), Some("1449373321"));
//!     Ok(())
//! })));
//!
//! let ctx = Context::new();
//! let mut msg = Message::new("dev/book/1449373321");
//! mux.handle_message(&mut msg, &ctx).await?;
//! # Ok(())
//! # }
//! ```

use courier_core::{Context, Error, Message, Pattern, DEFAULT_DELIMITER};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::RouteError;
use crate::handler::{
    middleware_fn, Endpoint, ErrorHandler, HandleFunc, Middleware, Next, SubjectFn,
};
use crate::trie::{Lookup, Node, Resolved, Route, RouteInfo, Target};

/// Trie based subject router
pub struct Mux {
    root: Node,
    delimiter: String,
    subject_fn: SubjectFn,
    error_handlers: Vec<ErrorHandler>,
}

impl Mux {
    /// Create a router using `/` between subject segments
    pub fn new() -> Self {
        Self::with_delimiter(DEFAULT_DELIMITER)
    }

    /// Create a router with a custom delimiter.
    ///
    /// An empty delimiter disables route parameters; patterns are then
    /// matched literally.
    pub fn with_delimiter(delimiter: impl Into<String>) -> Self {
        Self {
            root: Node::new(String::new()),
            delimiter: delimiter.into(),
            subject_fn: Arc::new(|msg: &Message| msg.subject.clone()),
            error_handlers: Vec::new(),
        }
    }

    /// Replace the function that extracts the routing subject from a message
    pub fn with_subject_fn(mut self, f: SubjectFn) -> Self {
        self.subject_fn = f;
        self
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Open a group whose patterns are relative to `prefix`
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            mux: self,
            prefix: prefix.to_string(),
        }
    }

    /// Register a handler; panics if one already exists for the pattern
    pub fn handler(&mut self, pattern: &str, handler: HandleFunc) -> &mut Self {
        self.group("").handler(pattern, handler);
        self
    }

    /// Register a handler wrapped in its own middlewares
    pub fn handler_with(
        &mut self,
        pattern: &str,
        handler: HandleFunc,
        middlewares: Vec<Middleware>,
    ) -> &mut Self {
        self.group("").handler_with(pattern, handler, middlewares);
        self
    }

    /// Register a handler, reporting duplicates instead of panicking
    pub fn try_handler(
        &mut self,
        pattern: &str,
        handler: HandleFunc,
        middlewares: Vec<Middleware>,
    ) -> Result<&mut Self, RouteError> {
        self.group("").try_handler(pattern, handler, middlewares)?;
        Ok(self)
    }

    /// Attach middlewares to every route
    pub fn middleware(&mut self, middlewares: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.group("").middleware(middlewares);
        self
    }

    /// Run `handler` before the rest of the chain
    pub fn pre_middleware(&mut self, handler: HandleFunc) -> &mut Self {
        self.group("").pre_middleware(handler);
        self
    }

    /// Run `handler` after the rest of the chain succeeded
    pub fn post_middleware(&mut self, handler: HandleFunc) -> &mut Self {
        self.group("").post_middleware(handler);
        self
    }

    /// Rewrite every message, then route it again from the root
    pub fn transform(&mut self, transform: HandleFunc) -> &mut Self {
        self.group("").transform(transform);
        self
    }

    /// Handler for subjects nothing else matches; middlewares apply
    pub fn default_handler(&mut self, handler: HandleFunc) -> &mut Self {
        self.group("").default_handler(handler);
        self
    }

    /// Handler for subjects nothing else matches; middlewares do not apply
    pub fn not_found_handler(&mut self, handler: HandleFunc) -> &mut Self {
        self.group("").not_found_handler(handler);
        self
    }

    /// Observe dispatch errors, e.g. for logging
    pub fn on_error(&mut self, handler: ErrorHandler) -> &mut Self {
        self.error_handlers.push(handler);
        self
    }

    /// List every registered entry, sorted by subject
    pub fn endpoints(&self) -> Vec<RouteInfo> {
        let mut routes = Vec::new();
        self.root.collect_routes(&mut routes);
        routes.sort();
        routes
    }

    /// Dispatch a message.
    ///
    /// Errors from handlers and middlewares are returned unchanged after the
    /// error handlers have seen them.
    pub async fn handle_message(&self, msg: &mut Message, ctx: &Context) -> courier_core::Result<()> {
        let subject = self.subject_of(msg);
        let result = self
            .dispatch_from(&self.root, subject, &mut *msg, ctx, false)
            .await;

        if let Err(err) = &result {
            for handler in &self.error_handlers {
                handler(&*msg, ctx, err);
            }
        }
        result
    }

    pub(crate) fn subject_of(&self, msg: &Message) -> String {
        (self.subject_fn)(msg)
    }

    pub(crate) fn dispatch_from<'b>(
        &'b self,
        start: &'b Node,
        subject: String,
        msg: &'b mut Message,
        ctx: &'b Context,
        resume: bool,
    ) -> BoxFuture<'b, courier_core::Result<()>> {
        Box::pin(async move {
            let Some(resolved) = Lookup::new(&subject, &self.delimiter).run(start, resume) else {
                debug!(subject = %subject, "no route");
                return Err(Error::NotFound(subject));
            };

            let Resolved {
                target,
                trail,
                params,
            } = resolved;
            for (name, range) in params {
                msg.route_params.insert(name, &subject[range]);
            }

            let mut chain: Vec<&Middleware> = trail
                .iter()
                .flat_map(|node| node.middlewares().iter())
                .collect();

            let endpoint = match target {
                Target::Route(route) | Target::Default(route) => {
                    chain.extend(route.middlewares.iter());
                    Endpoint::Handler(&route.handler)
                }
                Target::Transform(node) => {
                    trace!(subject = %subject, "transform boundary");
                    Endpoint::Transform { mux: self, node }
                }
                Target::NotFound(handler) => return handler(msg, ctx).await,
            };

            Next::new(&chain, endpoint).run(msg, ctx).await
        })
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mux")
            .field("delimiter", &self.delimiter)
            .field("endpoints", &self.endpoints().len())
            .finish()
    }
}

/// A set of routes sharing a subject prefix
///
/// Middlewares attached to a group apply to every route registered through
/// it or through nested groups.
pub struct Group<'m> {
    mux: &'m mut Mux,
    prefix: String,
}

impl<'m> Group<'m> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Open a nested group
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            mux: &mut *self.mux,
            prefix: format!("{}{}", self.prefix, prefix),
        }
    }

    fn node(&mut self, pattern: &str) -> Result<&mut Node, RouteError> {
        let full = format!("{}{}", self.prefix, pattern);
        let parsed = Pattern::parse(&full, &self.mux.delimiter)?;
        self.mux.root.insert(&parsed)
    }

    pub fn try_handler(
        &mut self,
        pattern: &str,
        handler: HandleFunc,
        middlewares: Vec<Middleware>,
    ) -> Result<&mut Self, RouteError> {
        self.node(pattern)?.set_route(Route {
            handler,
            middlewares,
        })?;
        Ok(self)
    }

    pub fn handler(&mut self, pattern: &str, handler: HandleFunc) -> &mut Self {
        fail_fast(self.try_handler(pattern, handler, Vec::new()))
    }

    pub fn handler_with(
        &mut self,
        pattern: &str,
        handler: HandleFunc,
        middlewares: Vec<Middleware>,
    ) -> &mut Self {
        fail_fast(self.try_handler(pattern, handler, middlewares))
    }

    pub fn middleware(&mut self, middlewares: impl IntoIterator<Item = Middleware>) -> &mut Self {
        fail_fast(self.node("")).add_middlewares(middlewares);
        self
    }

    pub fn pre_middleware(&mut self, handler: HandleFunc) -> &mut Self {
        self.middleware([pre(handler)])
    }

    pub fn post_middleware(&mut self, handler: HandleFunc) -> &mut Self {
        self.middleware([post(handler)])
    }

    /// Mark this group as a transform boundary.
    ///
    /// When dispatch reaches the group, the middlewares collected so far run
    /// around the transforms (in registration order). The subject is then
    /// recomputed and matched again from the group's position, starting at
    /// the beginning of the new subject.
    pub fn transform(&mut self, transform: HandleFunc) -> &mut Self {
        fail_fast(self.node("")).add_transform(transform);
        self
    }

    /// Subject extractor used after this group's transforms
    pub fn subject_fn(&mut self, f: SubjectFn) -> &mut Self {
        fail_fast(self.node("")).set_subject_fn(f);
        self
    }

    pub fn try_default_handler(&mut self, handler: HandleFunc) -> Result<&mut Self, RouteError> {
        self.node("")?.set_default(Route {
            handler,
            middlewares: Vec::new(),
        })?;
        Ok(self)
    }

    pub fn default_handler(&mut self, handler: HandleFunc) -> &mut Self {
        fail_fast(self.try_default_handler(handler))
    }

    pub fn try_not_found_handler(&mut self, handler: HandleFunc) -> Result<&mut Self, RouteError> {
        self.node("")?.set_not_found(handler)?;
        Ok(self)
    }

    pub fn not_found_handler(&mut self, handler: HandleFunc) -> &mut Self {
        fail_fast(self.try_not_found_handler(handler))
    }
}

fn fail_fast<T>(result: Result<T, RouteError>) -> T {
    result.unwrap_or_else(|e| panic!("route registration failed: {e}"))
}

/// Middleware running `handler` before the rest of the chain
pub fn pre(handler: HandleFunc) -> Middleware {
    middleware_fn(move |msg, ctx, next| {
        let handler = handler.clone();
        Box::pin(async move {
            handler(&mut *msg, ctx).await?;
            next.run(msg, ctx).await
        })
    })
}

/// Middleware running `handler` after the rest of the chain succeeded
pub fn post(handler: HandleFunc) -> Middleware {
    middleware_fn(move |msg, ctx, next| {
        let handler = handler.clone();
        Box::pin(async move {
            next.run(&mut *msg, ctx).await?;
            handler(msg, ctx).await
        })
    })
}
