//! Route handlers.
//!
//! Anything shaped like `async fn(Request) -> impl IntoResponse` is a
//! [`Handler`]. Registering one turns it into an [`Endpoint`]: a shared,
//! type-erased callable. Wrapping an endpoint in a middleware
//! [`Chain`](crate::middleware::Chain) yields another endpoint, so the router
//! never distinguishes bare routes from wrapped ones.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A boxed future resolving to a [`Response`].
///
/// Middlewares return `BoxFuture<'a>` borrowing themselves for `'a`;
/// endpoints return `BoxFuture<'static>`.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = Response> + Send + 'a>>;

/// Object-safe call interface behind [`Endpoint`].
pub(crate) trait Respond: Send + Sync + 'static {
    fn respond(&self, req: Request) -> BoxFuture<'static>;
}

/// Implemented for every value accepted by
/// [`Server::route`](crate::Server::route) and
/// [`Chain::wrap`](crate::middleware::Chain::wrap).
///
/// Sealed. Closures and `async fn`s qualify through a blanket impl and
/// [`Endpoint`] qualifies as itself.
pub trait Handler: sealed::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint;
}

mod sealed {
    pub trait Sealed {}
}

impl<F, Fut, R> sealed::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        Endpoint::from_respond(AsyncFn(self))
    }
}

struct AsyncFn<F>(F);

impl<F, Fut, R> Respond for AsyncFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn respond(&self, req: Request) -> BoxFuture<'static> {
        let pending = (self.0)(req);
        Box::pin(async move { pending.await.into_response() })
    }
}

/// A handler with its middleware already applied. Immutable and cheap to
/// clone; one endpoint may serve many requests at once.
#[derive(Clone)]
pub struct Endpoint(Arc<dyn Respond>);

impl Endpoint {
    pub fn new(handler: impl Handler) -> Self {
        handler.into_endpoint()
    }

    pub(crate) fn from_respond(inner: impl Respond) -> Self {
        Self(Arc::new(inner))
    }

    pub fn call(&self, req: Request) -> BoxFuture<'static> {
        self.0.respond(req)
    }
}

impl sealed::Sealed for Endpoint {}

impl Handler for Endpoint {
    fn into_endpoint(self) -> Endpoint {
        self
    }
}
