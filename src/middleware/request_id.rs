//! Request correlation middleware.

use http::HeaderValue;
use http::header::HeaderName;
use tracing::Instrument;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::request_id::RequestIdGenerator;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Longest inbound id that is propagated as-is.
const MAX_INBOUND_LEN: usize = 64;

/// Attaches a correlation id to every request.
///
/// An inbound `X-Request-Id` is kept when it is non-empty and at most 64
/// bytes; otherwise a fresh id comes from the generator. The id is placed
/// in the request [`Context`](crate::Context), recorded on a `request`
/// tracing span around the inner handler, and echoed in the response.
pub struct RequestId {
    ids: RequestIdGenerator,
}

impl RequestId {
    pub fn new(ids: RequestIdGenerator) -> Self {
        Self { ids }
    }
}

impl Middleware for RequestId {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let id = req
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && v.len() <= MAX_INBOUND_LEN)
            .map_or_else(|| self.ids.next_id(), str::to_owned);

        let span = tracing::debug_span!("request", request_id = %id);
        let ctx = req.context().with_request_id(id.as_str());
        let req = req.with_context(ctx);

        Box::pin(
            async move {
                let mut res = next.run(req).await;
                if let Ok(value) = HeaderValue::from_str(&id) {
                    res.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                res
            }
            .instrument(span),
        )
    }
}
