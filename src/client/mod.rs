//! HTTP client.
//!
//! A thin layer over `reqwest` that carries the server side's conventions
//! outbound: the request id from the [`Context`] goes out as
//! `X-Request-Id`, the context deadline caps the request timeout, and a
//! configured [`Tracer`] opens a client span and injects it into the
//! headers. Credentials come from [`ClientMiddleware`]s, applied in install
//! order.
//!
//! ```rust,no_run
//! use httpkit::{Client, Context};
//!
//! # async fn run() -> Result<(), httpkit::Error> {
//! let client = Client::builder("billing", "http://accounts.internal/")
//!     .bearer_token("s3cret")
//!     .build()?;
//! let (status, body) = client.get(&Context::new(), "/users/42").await?;
//! # let _ = (status, body);
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! No retries. Redirects follow `reqwest`'s default policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode};
use opentelemetry::trace::SpanKind;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;
use crate::middleware::REQUEST_ID_HEADER;
use crate::tracer::Tracer;

pub mod middleware;

pub use self::middleware::{BasicAuth, BearerToken, ClientMiddleware, X_TOKEN_HEADER, XToken};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct ClientBuilder {
    app_name: String,
    host: String,
    timeout: Duration,
    middlewares: Vec<Arc<dyn ClientMiddleware>>,
    tracer: Option<Tracer>,
}

impl ClientBuilder {
    /// Request, connect and TCP keep-alive timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn basic_auth(self, login: &str, password: &str) -> Self {
        self.middleware(BasicAuth::new(login, password))
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.middleware(BearerToken::new(token))
    }

    /// Sends the context value under `context_key` as `X-Token`.
    pub fn x_token(self, context_key: &str) -> Self {
        self.middleware(XToken::new(context_key))
    }

    pub fn middleware(mut self, middleware: impl ClientMiddleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        if self.timeout.is_zero() {
            return Err(Error::Config("client timeout must be > 0".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .tcp_keepalive(self.timeout)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .user_agent(self.app_name.as_str())
            .build()?;
        Ok(Client {
            inner: Arc::new(Inner {
                app_name: self.app_name,
                host: self.host,
                timeout: self.timeout,
                http,
                middlewares: self.middlewares,
                tracer: self.tracer,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

struct Inner {
    app_name: String,
    host: String,
    timeout: Duration,
    http: reqwest::Client,
    middlewares: Vec<Arc<dyn ClientMiddleware>>,
    tracer: Option<Tracer>,
    closed: AtomicBool,
}

/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// `host` is the base URL every path is appended to. One trailing `/`
    /// is dropped.
    pub fn builder(app_name: &str, host: &str) -> ClientBuilder {
        ClientBuilder {
            app_name: app_name.to_owned(),
            host: host.strip_suffix('/').unwrap_or(host).to_owned(),
            timeout: DEFAULT_TIMEOUT,
            middlewares: Vec::new(),
            tracer: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Sends `method host+path` with `body` and returns the status and the
    /// full response body. Non-2xx statuses are not errors.
    pub async fn execute(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        body: impl Into<Bytes>,
    ) -> Result<(StatusCode, Bytes), Error> {
        let inner = &*self.inner;
        let url = format!("{}{path}", inner.host);
        let body = body.into();

        let mut builder = inner.http.request(method.clone(), &url);
        if !body.is_empty() {
            builder = builder.body(body);
        }
        let mut request = builder.build()?;

        for middleware in &inner.middlewares {
            middleware.decorate(ctx, &mut request);
        }
        if let Some(id) = ctx.request_id().and_then(|id| HeaderValue::from_str(id).ok()) {
            request.headers_mut().insert(REQUEST_ID_HEADER, id);
        }
        if let Some(remaining) = ctx.remaining() {
            *request.timeout_mut() = Some(remaining.min(inner.timeout));
        }

        let _span = inner.tracer.as_ref().map(|tracer| {
            let parent = ctx.trace().cloned().unwrap_or_default();
            let span = tracer.start_span(format!("{method} {path}"), SpanKind::Client, &parent);
            tracer.inject(span.context(), request.headers_mut());
            span
        });

        debug!(app = %inner.app_name, method = %method, url = %url, "outbound request");
        let response = inner.http.execute(request).await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body))
    }

    pub async fn get(&self, ctx: &Context, path: &str) -> Result<(StatusCode, Bytes), Error> {
        self.execute(ctx, Method::GET, path, Bytes::new()).await
    }

    pub async fn post(&self, ctx: &Context, path: &str, body: impl Into<Bytes>) -> Result<(StatusCode, Bytes), Error> {
        self.execute(ctx, Method::POST, path, body).await
    }

    pub async fn put(&self, ctx: &Context, path: &str, body: impl Into<Bytes>) -> Result<(StatusCode, Bytes), Error> {
        self.execute(ctx, Method::PUT, path, body).await
    }

    pub async fn delete(&self, ctx: &Context, path: &str, body: impl Into<Bytes>) -> Result<(StatusCode, Bytes), Error> {
        self.execute(ctx, Method::DELETE, path, body).await
    }

    /// Flushes the tracer. Only the first call does anything; failures are
    /// logged.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tracer) = &self.inner.tracer {
            if let Err(e) = tracer.close() {
                warn!(closer = "tracer", "can't close: {e}");
            }
        }
    }
}
