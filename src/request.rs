//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

use crate::context::Context;

/// An incoming HTTP request with its body fully read.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) route: Option<Arc<str>>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) context: Context,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: Bytes,
        params: HashMap<String, String>,
        route: Option<Arc<str>>,
        remote_addr: SocketAddr,
        context: Context,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params,
            route,
            remote_addr: Some(remote_addr),
            context,
        }
    }

    /// Builds a request outside the server, e.g. to unit-test a handler or
    /// a middleware.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            route: None,
            remote_addr: None,
            context: Context::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn context(&self) -> &Context { &self.context }

    /// Header lookup; names are case-insensitive. Non-UTF-8 values read as
    /// absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The route pattern that matched (`/users/{id}`), `None` for requests
    /// handled by the not-found fallback.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Replaces the context with a derived one. Middlewares use this to
    /// hand enriched context to the handlers they wrap.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}
