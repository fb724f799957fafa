//! Handler deadline.

use std::time::Duration;

use http::StatusCode;
use tracing::warn;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// Answers `503 Service Unavailable` when the inner handler runs longer than
/// the limit. The handler future is dropped at that point.
///
/// The server installs one innermost with its write timeout, so logging and
/// metrics layers record the `503`.
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    limit: Duration,
}

impl Timeout {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl Middleware for Timeout {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let peer = req.remote_addr();
        Box::pin(async move {
            match tokio::time::timeout(self.limit, next.run(req)).await {
                Ok(res) => res,
                Err(_) => {
                    warn!(peer = ?peer, timeout = ?self.limit, "handler timed out");
                    Response::status(StatusCode::SERVICE_UNAVAILABLE)
                }
            }
        })
    }
}
