//! HTTP server and graceful shutdown.
//!
//! # Shutdown sequence
//!
//! When the [`Shutdown`] token handed to [`Listening::serve`] fires:
//!
//! 1. State becomes `Draining`. `/ready` answers 503; the listener is
//!    still open so requests routed before the load balancer noticed get
//!    served.
//! 2. After `graceful_delay` the state becomes `ShuttingDown`: the accept
//!    loop stops, the listener is dropped and every open connection is told
//!    to finish its current request and close (keep-alive off).
//! 3. Connections get `graceful_timeout` to drain. Whatever is still
//!    running then sees its request context cancelled and is aborted.
//! 4. Closers (tracer flush, user resources) run once each. Failures are
//!    logged as warnings.
//! 5. State becomes `Stopped` and `serve` returns.
//!
//! A fatal accept error skips the delay and goes straight to step 2; `serve`
//! then returns the error.
//!
//! Keep `graceful_delay + graceful_timeout` under the orchestrator's kill
//! deadline (`terminationGracePeriodSeconds` on Kubernetes).

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, error, info, warn};

use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::Error;
use crate::handler::{Endpoint, Handler};
use crate::health;
use crate::lifecycle::{Lifecycle, LifecycleState, Shutdown, StateCell};
use crate::middleware::{Chain, Logging, Metrics, Middleware, Recover, RequestId, Timeout, Tracing};
use crate::registry::MetricsRegistry;
use crate::request::Request;
use crate::request_id::RequestIdGenerator;
use crate::response::Response;
use crate::router::Router;
use crate::tracer::Tracer;

type CloseFn = Box<dyn FnOnce() -> Result<(), Error> + Send + 'static>;

struct Closer {
    name: String,
    close: CloseFn,
}

enum Layer {
    Ready(Arc<dyn Middleware>),
    /// Built at `build()` time, once the registry is known.
    Metrics,
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects options; [`build`](ServerBuilder::build) applies defaults, then
/// the options, then validates.
///
/// Middleware options (`logger`, `tracer`, `metrics`, `middleware`) install
/// in call order, inside the built-in `RequestId` and `Recover` and outside
/// the write-timeout layer.
pub struct ServerBuilder {
    app_name: String,
    config: ServerConfig,
    addr: Option<String>,
    timeout: Option<Duration>,
    graceful: Option<(Duration, Duration)>,
    logger: Option<Dispatch>,
    registry: Option<MetricsRegistry>,
    ids: Option<RequestIdGenerator>,
    layers: Vec<Layer>,
    not_found: Option<Endpoint>,
    closers: Vec<Closer>,
}

impl ServerBuilder {
    fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_owned(),
            config: ServerConfig::default(),
            addr: None,
            timeout: None,
            graceful: None,
            logger: None,
            registry: None,
            ids: None,
            layers: Vec::new(),
            not_found: None,
            closers: Vec::new(),
        }
    }

    /// Base configuration; the other options override it.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// `host:port` to bind. Port `0` picks an ephemeral one.
    pub fn addr(mut self, addr: &str) -> Self {
        self.addr = Some(addr.to_owned());
        self
    }

    /// Read, write and header timeouts.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn graceful_shutdown(mut self, delay: Duration, timeout: Duration) -> Self {
        self.graceful = Some((delay, timeout));
        self
    }

    pub fn openapi(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.openapi = Some(path.into());
        self
    }

    pub fn profiling(mut self, enabled: bool) -> Self {
        self.config.profiling = enabled;
        self
    }

    /// Runs the server under `dispatch` and logs every request through it.
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self.layers.push(Layer::Ready(Arc::new(Logging::new())));
        self
    }

    /// Opens a server span per request and flushes the tracer on shutdown.
    pub fn tracer(mut self, tracer: Tracer) -> Self {
        self.layers.push(Layer::Ready(Arc::new(Tracing::new(tracer.clone()))));
        self.closers.push(Closer {
            name: "tracer".to_owned(),
            close: Box::new(move || tracer.close()),
        });
        self
    }

    /// Records request metrics under the app name as prefix.
    pub fn metrics(mut self) -> Self {
        self.layers.push(Layer::Metrics);
        self
    }

    /// Registry to record into and expose at `/metrics`. A fresh one is
    /// created otherwise.
    pub fn metrics_registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn request_ids(mut self, ids: RequestIdGenerator) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Layer::Ready(Arc::new(middleware)));
        self
    }

    /// Replaces the default `404` for unmatched requests. It runs through
    /// the middleware chain like any route.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(Endpoint::new(handler));
        self
    }

    /// Registers a resource to release after the server stops serving.
    pub fn closer(
        mut self,
        name: impl Into<String>,
        close: impl FnOnce() -> Result<(), Error> + Send + 'static,
    ) -> Self {
        self.closers.push(Closer { name: name.into(), close: Box::new(close) });
        self
    }

    pub fn build(self) -> Result<Server, Error> {
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("app name must not be empty".into()));
        }

        let mut config = self.config;
        if let Some(addr) = &self.addr {
            config.set_addr(addr)?;
        }
        if let Some(timeout) = self.timeout {
            config.set_timeout(timeout);
        }
        if let Some((delay, timeout)) = self.graceful {
            config.graceful_delay = delay;
            config.graceful_timeout = timeout;
        }
        config.validate()?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => MetricsRegistry::new()?,
        };

        let mut chain = Chain::new();
        chain.push(Arc::new(RequestId::new(self.ids.unwrap_or_default())));
        chain.push(Arc::new(Recover::new()));
        for layer in self.layers {
            let middleware: Arc<dyn Middleware> = match layer {
                Layer::Ready(middleware) => middleware,
                Layer::Metrics => Arc::new(Metrics::new(registry.clone(), &self.app_name)?),
            };
            chain.push(middleware);
        }
        chain.push(Arc::new(Timeout::new(config.write_timeout)));

        let not_found = match self.not_found {
            Some(handler) => chain.wrap(handler),
            None => chain.wrap(not_found),
        };

        Ok(Server {
            app_name: self.app_name,
            config,
            chain,
            router: Router::new(),
            not_found,
            registry,
            logger: self.logger,
            closers: self.closers,
            state: StateCell::new(),
        })
    }
}

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A configured server in state `Created`. Register routes, then
/// [`listen`](Server::listen) or [`start`](Server::start).
pub struct Server {
    app_name: String,
    config: ServerConfig,
    chain: Chain,
    router: Router,
    not_found: Endpoint,
    registry: MetricsRegistry,
    logger: Option<Dispatch>,
    closers: Vec<Closer>,
    state: StateCell,
}

impl Server {
    pub fn builder(app_name: &str) -> ServerBuilder {
        ServerBuilder::new(app_name)
    }

    /// Wraps `handler` in the server's middleware chain and registers it.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` reads them.
    /// A malformed or conflicting pattern is an error.
    pub fn route(&mut self, method: Method, path: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        let endpoint = self.chain.wrap(handler);
        self.router.insert(method, path, endpoint)?;
        Ok(self)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.watch()
    }

    /// Binds the listener and installs the standard endpoints. The server
    /// is `Running` once this returns.
    pub async fn listen(self) -> Result<Listening, Error> {
        let dispatch = self.dispatch();
        self.bind().with_subscriber(dispatch).await
    }

    /// [`listen`](Server::listen) then [`serve`](Listening::serve).
    pub async fn start(self, shutdown: Shutdown) -> Result<(), Error> {
        self.listen().await?.serve(shutdown).await
    }

    fn dispatch(&self) -> Dispatch {
        match &self.logger {
            Some(dispatch) => dispatch.clone(),
            None => tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    async fn bind(mut self) -> Result<Listening, Error> {
        self.install_standard_endpoints()?;

        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr()?;

        for (method, path) in self.router.routes() {
            info!(method = %method, path, "route");
        }
        self.state.set(LifecycleState::Running);
        info!(app = %self.app_name, addr = %local_addr, "http-server listening");

        Ok(Listening { server: self, listener, local_addr })
    }

    fn install_standard_endpoints(&mut self) -> Result<(), Error> {
        let router = &mut self.router;
        router.insert(Method::GET, health::HEALTH_PATH, Endpoint::new(health::health))?;
        router.insert(Method::GET, health::READY_PATH, Endpoint::new(health::ready(self.state.watch())))?;
        router.insert(Method::GET, health::METRICS_PATH, Endpoint::new(health::metrics(self.registry.clone())))?;
        if let Some(path) = &self.config.openapi {
            router.insert(Method::GET, health::OPENAPI_PATH, Endpoint::new(health::openapi(path.clone())))?;
        }
        if self.config.profiling {
            router.insert(Method::GET, health::PPROF_INDEX_PATH, Endpoint::new(health::pprof_index))?;
            router.insert(Method::GET, health::PPROF_RUNTIME_PATH, Endpoint::new(health::pprof_runtime))?;
        }
        Ok(())
    }
}

// ── Listening ─────────────────────────────────────────────────────────────────

/// A bound server, not yet accepting.
pub struct Listening {
    server: Server,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Listening {
    /// The bound address; useful when listening on port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.server.lifecycle()
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.server.registry
    }

    /// Accepts connections until `shutdown` fires, then runs the shutdown
    /// sequence. Returns once the server is `Stopped`.
    ///
    /// Transient accept failures (descriptor exhaustion, aborted handshakes)
    /// are retried with backoff. Any other accept failure ends serving: open
    /// connections are drained, closers run, and the error is returned as
    /// [`Error::Io`].
    pub async fn serve(self, shutdown: Shutdown) -> Result<(), Error> {
        let dispatch = self.server.dispatch();
        self.run(shutdown, dispatch.clone()).with_subscriber(dispatch).await
    }

    async fn run(self, shutdown: Shutdown, dispatch: Dispatch) -> Result<(), Error> {
        let Listening { server, listener, local_addr } = self;
        let Server { config, router, not_found, closers, state, .. } = server;

        let shared = Arc::new(Shared {
            router,
            not_found,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            abort: Shutdown::new(),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let controller = tokio::spawn(
            control(shutdown, state.clone(), config.graceful_delay, Arc::clone(&stop_tx))
                .with_current_subscriber(),
        );

        let mut conn_builder = ConnBuilder::new(ScopedExecutor { dispatch });
        conn_builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(config.header_timeout);

        let mut tasks = JoinSet::new();
        let stop = stopped(stop_rx.clone());
        tokio::pin!(stop);
        let mut backoff: Option<Duration> = None;
        let mut failure: Option<io::Error> = None;

        loop {
            tokio::select! {
                biased;

                () = &mut stop => break,

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => {
                            backoff = None;
                            v
                        }
                        Err(e) if is_transient_accept_error(&e) => {
                            let delay = next_backoff(backoff);
                            backoff = Some(delay);
                            warn!(retry_in = ?delay, "accept error: {e}");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        Err(e) => {
                            error!("accept failed, stopping: {e}");
                            failure = Some(e);
                            break;
                        }
                    };
                    tasks.spawn(
                        serve_connection(
                            conn_builder.clone(),
                            stream,
                            remote_addr,
                            Arc::clone(&shared),
                            stop_rx.clone(),
                        )
                        .with_current_subscriber(),
                    );
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        if failure.is_some() {
            // No shutdown was requested; stand the controller down and close
            // the open connections ourselves.
            controller.abort();
            state.set(LifecycleState::ShuttingDown);
            stop_tx.send_replace(true);
        }
        info!(addr = %local_addr, in_flight = tasks.len(), "http-server is shutting down...");

        let drained = tokio::time::timeout(config.graceful_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        match drained {
            Ok(()) => info!("http-server was successfully stopped"),
            Err(_) => {
                warn!(
                    remaining = tasks.len(),
                    timeout = ?config.graceful_timeout,
                    "graceful timeout expired, aborting in-flight requests"
                );
                shared.abort.trigger();
                tasks.shutdown().await;
            }
        }

        run_closers(closers).await;
        state.set(LifecycleState::Stopped);

        match controller.await {
            Err(e) if !e.is_cancelled() => error!("shutdown controller failed: {e}"),
            _ => {}
        }
        match failure {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }
}

/// Waits for the token, then walks the server through `Draining` and
/// `ShuttingDown` and tells the accept loop to stop.
async fn control(shutdown: Shutdown, state: StateCell, delay: Duration, stop: Arc<watch::Sender<bool>>) {
    shutdown.triggered().await;
    state.set(LifecycleState::Draining);
    info!(delay = ?delay, "shutdown requested, draining");

    tokio::time::sleep(delay).await;

    state.set(LifecycleState::ShuttingDown);
    stop.send_replace(true);
}

/// Accept failures worth retrying: the peer went away before we took the
/// connection, or the process is out of descriptors or memory for now.
fn is_transient_accept_error(e: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    ) || matches!(e.raw_os_error(), Some(ENFILE | EMFILE))
}

/// 5ms, doubling, capped at 1s.
fn next_backoff(previous: Option<Duration>) -> Duration {
    const FIRST: Duration = Duration::from_millis(5);
    const MAX: Duration = Duration::from_secs(1);
    match previous {
        None => FIRST,
        Some(d) => (d * 2).min(MAX),
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn run_closers(closers: Vec<Closer>) {
    for Closer { name, close } in closers {
        match tokio::task::spawn_blocking(close).await {
            Ok(Ok(())) => debug!(closer = %name, "closed"),
            Ok(Err(e)) => warn!(closer = %name, "close failed: {e}"),
            Err(e) => warn!(closer = %name, "close panicked: {e}"),
        }
    }
}

// ── Connections and dispatch ──────────────────────────────────────────────────

struct Shared {
    router: Router,
    not_found: Endpoint,
    read_timeout: Duration,
    write_timeout: Duration,
    /// Fired when the graceful timeout expires; seen by handlers as a
    /// cancelled request context.
    abort: Shutdown,
}

/// Spawns HTTP/2 stream tasks under the server's subscriber.
#[derive(Clone)]
struct ScopedExecutor {
    dispatch: Dispatch,
}

impl<F> hyper::rt::Executor<F> for ScopedExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::spawn(fut.with_subscriber(self.dispatch.clone()));
    }
}

async fn serve_connection(
    builder: ConnBuilder<ScopedExecutor>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    shared: Arc<Shared>,
    stop: watch::Receiver<bool>,
) {
    let svc = service_fn(move |req| {
        let shared = Arc::clone(&shared);
        async move { Ok::<_, Infallible>(dispatch(&shared, req, remote_addr).await) }
    });

    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);
    let stop = stopped(stop);
    tokio::pin!(stop);
    let mut closing = false;

    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(peer = %remote_addr, "connection error: {e}");
                }
                break;
            }
            () = &mut stop, if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Routes one request and produces one response. Every failure becomes a
/// status code, so hyper never sees an error.
async fn dispatch(
    shared: &Shared,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();

    let body = match tokio::time::timeout(shared.read_timeout, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) => {
            debug!(peer = %remote_addr, "failed to read request body: {e}");
            return Response::status(StatusCode::BAD_REQUEST).into_inner();
        }
        Err(_) => return Response::status(StatusCode::REQUEST_TIMEOUT).into_inner(),
    };

    let context = Context::new()
        .with_timeout(shared.write_timeout)
        .with_cancellation(shared.abort.clone());

    let (handler, route, params) = match shared.router.lookup(&parts.method, parts.uri.path()) {
        Some(matched) => (matched.handler, Some(matched.route), matched.params),
        None => (shared.not_found.clone(), None, HashMap::new()),
    };

    let request = Request::new(parts, body, params, route, remote_addr, context);
    handler.call(request).await.into_inner()
}
