//! Middleware layer.
//!
//! A middleware sees the request before the handler it wraps and the
//! response after it. Chains are composed once, at route registration, and
//! never reordered afterwards.
//!
//! # Ordering
//!
//! For `Chain::new().with(m1).with(m2).with(m3).wrap(h)`:
//!
//! ```text
//! request  ─▶ m1 ─▶ m2 ─▶ m3 ─▶ h
//! response ◀─ m1 ◀─ m2 ◀─ m3 ◀─┘
//! ```
//!
//! Install order is request order; response order is its reverse.
//!
//! # Writing one
//!
//! ```rust
//! use httpkit::{BoxFuture, Request};
//! use httpkit::middleware::{Middleware, Next};
//!
//! struct Poweredby;
//!
//! impl Middleware for Poweredby {
//!     fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
//!         Box::pin(async move {
//!             let mut res = next.run(req).await;
//!             res.headers_mut().insert("x-powered-by", "httpkit".parse().unwrap());
//!             res
//!         })
//!     }
//! }
//! ```
//!
//! [`Next::run`] takes `self`, so the inner handler runs at most once per
//! invocation. Not calling it short-circuits the chain; the middleware then
//! owns the response (see [`auth`]).

use std::sync::Arc;

use crate::handler::{BoxFuture, Endpoint, Handler, Respond};
use crate::request::Request;

pub mod auth;
pub mod cors;
pub mod logging;
pub mod metrics;
pub mod no_cache;
pub mod recover;
pub mod request_id;
pub mod timeout;
pub mod tracing;
pub mod version;

pub use self::auth::{BasicAuth, BearerAuth, HeaderAuth};
pub use self::cors::Cors;
pub use self::logging::Logging;
pub use self::metrics::Metrics;
pub use self::no_cache::NoCache;
pub use self::recover::Recover;
pub use self::request_id::{REQUEST_ID_HEADER, RequestId};
pub use self::timeout::Timeout;
pub use self::tracing::Tracing;
pub use self::version::{VERSION_HEADER, Version};

/// A request interceptor.
///
/// Implementors are plain structs holding their configuration (a token, a
/// metrics registry, a tracer); they keep no per-request state.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a>;
}

/// The rest of the chain after the current middleware.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    endpoint: &'a Endpoint,
}

impl<'a> Next<'a> {
    /// Hands the request to the next middleware, or to the handler when
    /// this was the innermost one.
    pub fn run(self, req: Request) -> BoxFuture<'a> {
        match self.rest.split_first() {
            Some((head, rest)) => head.handle(req, Next { rest, endpoint: self.endpoint }),
            None => self.endpoint.call(req),
        }
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered list of middlewares, outermost first.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` inside the ones already installed.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub(crate) fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Composes the chain around `handler`. The result is immutable; later
    /// changes to this `Chain` do not affect it.
    pub fn wrap(&self, handler: impl Handler) -> Endpoint {
        let endpoint = handler.into_endpoint();
        if self.layers.is_empty() {
            return endpoint;
        }
        Endpoint::from_respond(Wrapped {
            layers: self.layers.clone().into(),
            endpoint,
        })
    }
}

struct Wrapped {
    layers: Arc<[Arc<dyn Middleware>]>,
    endpoint: Endpoint,
}

impl Respond for Wrapped {
    fn respond(&self, req: Request) -> BoxFuture<'static> {
        let layers = Arc::clone(&self.layers);
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            Next { rest: &layers, endpoint: &endpoint }.run(req).await
        })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::testing::get;
    use super::*;
    use crate::Response;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Record {
        name: String,
        journal: Journal,
    }

    impl Middleware for Record {
        fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
            Box::pin(async move {
                self.journal.lock().unwrap().push(format!("{}-before", self.name));
                let res = next.run(req).await;
                self.journal.lock().unwrap().push(format!("{}-after", self.name));
                res
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle<'a>(&'a self, _req: Request, _next: Next<'a>) -> BoxFuture<'a> {
            Box::pin(async { Response::status(StatusCode::FORBIDDEN) })
        }
    }

    fn recording_handler(journal: &Journal) -> impl Handler + use<> {
        let journal = Arc::clone(journal);
        move |_req: Request| {
            let journal = Arc::clone(&journal);
            async move {
                journal.lock().unwrap().push("handler".to_owned());
                Response::status(StatusCode::IM_A_TEAPOT)
            }
        }
    }

    #[tokio::test]
    async fn side_effects_nest_in_install_order() {
        for n in 0..5 {
            let journal: Journal = Arc::default();
            let chain = (1..=n).fold(Chain::new(), |chain, i| {
                chain.with(Record { name: format!("m{i}"), journal: Arc::clone(&journal) })
            });

            let res = chain.wrap(recording_handler(&journal)).call(get("/")).await;
            assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);

            let mut expected: Vec<String> = (1..=n).map(|i| format!("m{i}-before")).collect();
            expected.push("handler".to_owned());
            expected.extend((1..=n).rev().map(|i| format!("m{i}-after")));
            assert_eq!(*journal.lock().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_layers_and_handler() {
        let journal: Journal = Arc::default();
        let endpoint = Chain::new()
            .with(Record { name: "outer".into(), journal: Arc::clone(&journal) })
            .with(Deny)
            .with(Record { name: "inner".into(), journal: Arc::clone(&journal) })
            .wrap(recording_handler(&journal));

        let res = endpoint.call(get("/")).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(*journal.lock().unwrap(), ["outer-before", "outer-after"]);
    }

    #[tokio::test]
    async fn wrapped_endpoint_ignores_later_chain_changes() {
        let journal: Journal = Arc::default();
        let chain = Chain::new().with(Record { name: "a".into(), journal: Arc::clone(&journal) });
        let endpoint = chain.wrap(recording_handler(&journal));
        let _grown = chain.with(Deny);

        let res = endpoint.call(get("/")).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(journal.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_chain_is_the_bare_handler() {
        let journal: Journal = Arc::default();
        let res = Chain::new().wrap(recording_handler(&journal)).call(get("/")).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(*journal.lock().unwrap(), ["handler"]);
    }
}
