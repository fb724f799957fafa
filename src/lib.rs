//! # httpkit
//!
//! HTTP server and client scaffolding for services that run behind a load
//! balancer and shut down on SIGTERM.
//!
//! ## What the server does for you
//!
//! - Radix-tree routing via [`matchit`], one tree per method
//! - A middleware chain composed once per route: request ids and panic
//!   recovery always, then logging, tracing, metrics, auth, CORS, whatever
//!   you install, in install order, with the write timeout innermost
//! - Request correlation: `X-Request-Id` propagated or generated as
//!   `<host>/<random>-<sequence>`
//! - `/health`, `/ready`, `/metrics`, and optionally `/openapi.json` and
//!   `/debug/pprof/`
//! - Graceful shutdown: drain delay, keep-alive off, bounded drain,
//!   closers, all observable through [`Lifecycle`]
//!
//! No process-global state: each server owns its [`MetricsRegistry`] and
//! [`RequestIdGenerator`], so several servers can live in one process.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use httpkit::{Method, Request, Response, Server, Shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), httpkit::Error> {
//!     httpkit::logging::init("info", false)?;
//!
//!     let mut server = Server::builder("users-api")
//!         .addr("0.0.0.0:3000")
//!         .metrics()
//!         .build()?;
//!     server
//!         .route(Method::GET, "/users/{id}", get_user)?
//!         .route(Method::POST, "/users", create_user)?;
//!
//!     server.start(Shutdown::on_os_signals()).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(httpkit::StatusCode::BAD_REQUEST);
//!     }
//!     Response::builder()
//!         .status(httpkit::StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .json(r#"{"id":"99"}"#)
//! }
//! ```

mod context;
mod error;
mod handler;
mod lifecycle;
mod request;
mod response;
mod router;
mod server;

pub mod client;
pub mod config;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod request_id;
pub mod tracer;

pub use client::{Client, ClientBuilder};
pub use config::{ServerConfig, ServerSpecs};
pub use context::Context;
pub use error::Error;
pub use handler::{BoxFuture, Endpoint, Handler};
pub use http::{HeaderMap, Method, StatusCode};
pub use lifecycle::{Lifecycle, LifecycleState, Shutdown};
pub use registry::MetricsRegistry;
pub use request::Request;
pub use request_id::RequestIdGenerator;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::{Listening, Server, ServerBuilder};
pub use tracer::Tracer;
