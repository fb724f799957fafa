//! Credential checks.
//!
//! | Credentials | Response |
//! |---|---|
//! | absent (or unparsable Basic header) | `401 Unauthorized` |
//! | present but wrong | `403 Forbidden` |
//! | correct | forwarded to the inner handler unchanged |
//!
//! Secrets are compared with [`subtle::ConstantTimeEq`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderName};
use subtle::ConstantTimeEq;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

fn secret_eq(given: &[u8], expected: &[u8]) -> bool {
    given.ct_eq(expected).into()
}

fn reject(status: StatusCode) -> BoxFuture<'static> {
    Box::pin(async move { Response::status(status) })
}

// ── Basic ─────────────────────────────────────────────────────────────────────

/// HTTP Basic authentication against one login/password pair.
pub struct BasicAuth {
    login: String,
    password: String,
}

impl BasicAuth {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self { login: login.into(), password: password.into() }
    }
}

/// `Authorization: Basic base64(login:password)` → `(login, password)`.
fn basic_credentials(req: &Request) -> Option<(String, String)> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_owned(), password.to_owned()))
}

impl Middleware for BasicAuth {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let Some((login, password)) = basic_credentials(&req) else {
            return reject(StatusCode::UNAUTHORIZED);
        };
        // `&` rather than `&&`: check both halves regardless of the first.
        let valid = secret_eq(login.as_bytes(), self.login.as_bytes())
            & secret_eq(password.as_bytes(), self.password.as_bytes());
        if !valid {
            return reject(StatusCode::FORBIDDEN);
        }
        next.run(req)
    }
}

// ── Bearer ────────────────────────────────────────────────────────────────────

/// `Authorization: Bearer <token>` against one static token.
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Middleware for BearerAuth {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let Some(header) = req.headers().get(AUTHORIZATION) else {
            return reject(StatusCode::UNAUTHORIZED);
        };
        let valid = header
            .to_str()
            .ok()
            .and_then(|h| h.split_once(' '))
            .is_some_and(|(scheme, token)| {
                scheme == "Bearer" && secret_eq(token.as_bytes(), self.token.as_bytes())
            });
        if !valid {
            return reject(StatusCode::FORBIDDEN);
        }
        next.run(req)
    }
}

// ── Custom header ─────────────────────────────────────────────────────────────

/// A static token carried in a custom header, e.g. `X-Token`.
pub struct HeaderAuth {
    header: HeaderName,
    token: String,
}

impl HeaderAuth {
    pub fn new(header: HeaderName, token: impl Into<String>) -> Self {
        Self { header, token: token.into() }
    }

    /// `X-Token: <token>`, the header the client's `x_token` option sends.
    pub fn x_token(token: impl Into<String>) -> Self {
        Self::new(HeaderName::from_static("x-token"), token)
    }
}

impl Middleware for HeaderAuth {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let Some(value) = req.headers().get(&self.header) else {
            return reject(StatusCode::UNAUTHORIZED);
        };
        if !secret_eq(value.as_bytes(), self.token.as_bytes()) {
            return reject(StatusCode::FORBIDDEN);
        }
        next.run(req)
    }
}
