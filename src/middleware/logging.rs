//! Access logging.

use std::time::Instant;

use tracing::debug;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Emits one `debug` event per request once the inner handler returned:
/// method, URI, protocol, status, latency in milliseconds and, when
/// present, the request id.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logging;

impl Logging {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Logging {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let proto = req.version();
        let request_id = req.context().request_id().map(str::to_owned);

        Box::pin(async move {
            let start = Instant::now();
            let res = next.run(req).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            debug!(
                source = "http-server",
                method = %method,
                uri = %uri,
                proto = ?proto,
                status = res.status_code().as_u16(),
                latency_ms,
                request_id = request_id.as_deref().unwrap_or(""),
                "request"
            );
            res
        })
    }
}
