//! Minimal httpkit server: JSON endpoints, request metrics, a protected
//! route and graceful shutdown on Ctrl-C.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -i -H 'x-token: letmein' http://localhost:3000/admin
//!   curl http://localhost:3000/metrics
//!   curl http://localhost:3000/ready

use std::time::Duration;

use httpkit::middleware::{Chain, Cors, HeaderAuth, Version};
use httpkit::{Method, Request, Response, Server, Shutdown, StatusCode};

#[tokio::main]
async fn main() -> Result<(), httpkit::Error> {
    let logger = httpkit::logging::dispatch("info,httpkit=debug", false)?;

    let mut server = Server::builder("users-api")
        .addr("127.0.0.1:3000")
        .graceful_shutdown(Duration::from_secs(1), Duration::from_secs(5))
        .logger(logger)
        .metrics()
        .middleware(Cors::new())
        .middleware(Version::new(env!("CARGO_PKG_VERSION"))?)
        .build()?;

    // Per-route middleware: wrap before registering.
    let admin = Chain::new().with(HeaderAuth::x_token("letmein")).wrap(admin);

    server
        .route(Method::GET, "/users/{id}", get_user)?
        .route(Method::POST, "/users", create_user)?
        .route(Method::DELETE, "/users/{id}", delete_user)?
        .route(Method::GET, "/admin", admin)?;

    server.start(Shutdown::on_os_signals()).await
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /users
//
// req.body() is &[u8]; parse it with serde_json::from_slice or similar.
async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#)
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(_req: Request) -> Response {
    Response::status(StatusCode::NO_CONTENT)
}

async fn admin(req: Request) -> Response {
    let id = req.context().request_id().unwrap_or("-").to_owned();
    Response::text(format!("hello admin, request {id}\n"))
}
