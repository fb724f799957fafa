//! Cache suppression.

use http::HeaderValue;
use http::header::{
    CACHE_CONTROL, ETAG, EXPIRES, HeaderName, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    IF_RANGE, IF_UNMODIFIED_SINCE, PRAGMA,
};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

const ETAG_REQUEST_HEADERS: [HeaderName; 6] =
    [ETAG, IF_MODIFIED_SINCE, IF_MATCH, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE];

const X_ACCEL_EXPIRES: HeaderName = HeaderName::from_static("x-accel-expires");

/// Tells clients and proxies never to cache, and drops conditional request
/// headers so handlers always produce a full response.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl NoCache {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for NoCache {
    fn handle<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a> {
        for name in &ETAG_REQUEST_HEADERS {
            req.headers_mut().remove(name);
        }
        Box::pin(async move {
            let mut res = next.run(req).await;
            let h = res.headers_mut();
            h.insert(EXPIRES, HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 UTC"));
            h.insert(
                CACHE_CONTROL,
                HeaderValue::from_static(
                    "no-cache, no-store, no-transform, must-revalidate, private, max-age=0",
                ),
            );
            h.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            h.insert(X_ACCEL_EXPIRES, HeaderValue::from_static("0"));
            res
        })
    }
}
