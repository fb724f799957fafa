//! Outbound request decorators.
//!
//! A client middleware edits the outgoing request before it is sent. It
//! cannot short-circuit and never sees the response.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::HeaderValue;
use http::header::{AUTHORIZATION, HeaderName};

use crate::context::Context;

pub const X_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-token");

pub trait ClientMiddleware: Send + Sync + 'static {
    fn decorate(&self, ctx: &Context, req: &mut reqwest::Request);
}

impl<F> ClientMiddleware for F
where
    F: Fn(&Context, &mut reqwest::Request) + Send + Sync + 'static,
{
    fn decorate(&self, ctx: &Context, req: &mut reqwest::Request) {
        self(ctx, req)
    }
}

/// HTTP Basic credentials.
pub struct BasicAuth {
    value: Option<HeaderValue>,
}

impl BasicAuth {
    pub fn new(login: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{login}:{password}"));
        let value = HeaderValue::from_str(&format!("Basic {encoded}")).ok().map(|mut v| {
            v.set_sensitive(true);
            v
        });
        Self { value }
    }
}

impl ClientMiddleware for BasicAuth {
    fn decorate(&self, _ctx: &Context, req: &mut reqwest::Request) {
        if let Some(value) = &self.value {
            req.headers_mut().insert(AUTHORIZATION, value.clone());
        }
    }
}

/// `Authorization: Bearer <token>`.
pub struct BearerToken {
    value: Option<HeaderValue>,
}

impl BearerToken {
    pub fn new(token: &str) -> Self {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).ok().map(|mut v| {
            v.set_sensitive(true);
            v
        });
        Self { value }
    }
}

impl ClientMiddleware for BearerToken {
    fn decorate(&self, _ctx: &Context, req: &mut reqwest::Request) {
        if let Some(value) = &self.value {
            req.headers_mut().insert(AUTHORIZATION, value.clone());
        }
    }
}

/// Copies the context value under `key` into `X-Token`. Requests whose
/// context lacks the key go out without the header.
pub struct XToken {
    key: String,
}

impl XToken {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl ClientMiddleware for XToken {
    fn decorate(&self, ctx: &Context, req: &mut reqwest::Request) {
        let Some(token) = ctx.value(&self.key) else {
            return;
        };
        if let Ok(mut value) = HeaderValue::from_str(token) {
            value.set_sensitive(true);
            req.headers_mut().insert(X_TOKEN_HEADER, value);
        }
    }
}
