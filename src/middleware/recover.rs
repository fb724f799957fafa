//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// Turns a panic anywhere inside the chain into a `500` response, so a
/// connected client always gets a terminal status. The server installs it
/// just inside [`RequestId`](super::RequestId).
#[derive(Clone, Copy, Debug, Default)]
pub struct Recover;

impl Recover {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Recover {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        Box::pin(async move {
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(res) => res,
                Err(payload) => {
                    error!(method = %method, uri = %uri, panic = panic_message(&*payload), "handler panicked");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
