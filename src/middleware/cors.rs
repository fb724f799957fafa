//! Cross-origin resource sharing headers.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_METHOD, HeaderValue, ORIGIN, VARY,
};
use http::{HeaderMap, Method};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Adds CORS headers to responses for requests that carry `Origin`.
///
/// Header-only: the request always reaches the inner handler, preflights
/// included. The default policy allows any origin with credentials, which
/// means the caller's origin is reflected rather than sending `*`.
#[derive(Clone, Debug)]
pub struct Cors {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<Method>,
    allowed_headers: Vec<String>,
    exposed_headers: Vec<String>,
    allow_credentials: bool,
    max_age_secs: u32,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_owned()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allowed_headers: [
                "Accept",
                "X-Token",
                "X-Compress",
                "Content-Type",
                "Content-Length",
                "Accept-Encoding",
                "X-CSRF-Token",
            ]
            .map(str::to_owned)
            .to_vec(),
            exposed_headers: vec!["Link".to_owned()],
            allow_credentials: true,
            max_age_secs: 300,
        }
    }
}

impl Cors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    pub fn allowed_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn exposed_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age_secs(mut self, secs: u32) -> Self {
        self.max_age_secs = secs;
        self
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == "*" || o.eq_ignore_ascii_case(origin))
    }

    fn wildcard(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    fn apply(&self, origin: &str, preflight: bool, headers: &mut HeaderMap) {
        let allow_origin = if self.wildcard() && !self.allow_credentials {
            HeaderValue::from_static("*")
        } else {
            match HeaderValue::from_str(origin) {
                Ok(v) => v,
                Err(_) => return,
            }
        };
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.append(VARY, HeaderValue::from_static("Origin"));
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if !self.exposed_headers.is_empty() {
            if let Ok(v) = HeaderValue::from_str(&self.exposed_headers.join(", ")) {
                headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, v);
            }
        }
        if preflight {
            let methods = self
                .allowed_methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(v) = HeaderValue::from_str(&methods) {
                headers.insert(ACCESS_CONTROL_ALLOW_METHODS, v);
            }
            if let Ok(v) = HeaderValue::from_str(&self.allowed_headers.join(", ")) {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, v);
            }
            if self.max_age_secs > 0 {
                headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(self.max_age_secs));
            }
        }
    }
}

impl Middleware for Cors {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let origin = req
            .header(ORIGIN.as_str())
            .filter(|o| self.origin_allowed(o))
            .map(str::to_owned);
        let preflight = req.method() == Method::OPTIONS
            && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD);

        Box::pin(async move {
            let mut res = next.run(req).await;
            if let Some(origin) = origin {
                self.apply(&origin, preflight, res.headers_mut());
            }
            res
        })
    }
}
