//! Application version tag.

use http::HeaderValue;
use http::header::HeaderName;

use super::{Middleware, Next};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;

pub const VERSION_HEADER: HeaderName = HeaderName::from_static("x-app-version");

/// Stamps every response with `X-App-Version`.
pub struct Version {
    value: HeaderValue,
}

impl Version {
    /// Fails if `version` is not a valid header value.
    pub fn new(version: &str) -> Result<Self, Error> {
        let value = HeaderValue::from_str(version)
            .map_err(|_| Error::Config(format!("invalid app version `{version}`")))?;
        Ok(Self { value })
    }
}

impl Middleware for Version {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut res = next.run(req).await;
            res.headers_mut().insert(VERSION_HEADER, self.value.clone());
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use crate::middleware::testing::{get, ok};

    #[tokio::test]
    async fn stamps_version() {
        let res = Chain::new().with(Version::new("0.0.2").unwrap()).wrap(ok).call(get("/")).await;
        assert_eq!(res.headers()[VERSION_HEADER], "0.0.2");
    }

    #[test]
    fn rejects_non_header_value() {
        assert!(Version::new("1.0\n").is_err());
    }
}
