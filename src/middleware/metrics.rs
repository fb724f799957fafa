//! Request metrics.
//!
//! Counts every request before the handler runs and every response after it,
//! and records the elapsed time. See [`crate::registry`] for the collector
//! names and buckets.

use std::time::Instant;

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::registry::{HttpCollectors, MetricsRegistry};
use crate::request::Request;

use super::{Middleware, Next};

/// Route label for requests that matched no route. Keeps label
/// cardinality bounded when clients probe random paths.
pub const UNMATCHED_ROUTE: &str = "/*";

pub struct Metrics {
    registry: MetricsRegistry,
    collectors: HttpCollectors,
}

impl Metrics {
    /// Registers the HTTP collectors under `prefix`. Fails if they already
    /// exist in `registry`.
    pub fn new(registry: MetricsRegistry, prefix: &str) -> Result<Self, Error> {
        let collectors = HttpCollectors::register(&registry, prefix)?;
        Ok(Self { registry, collectors })
    }

    pub fn collectors(&self) -> &HttpCollectors {
        &self.collectors
    }
}

impl Middleware for Metrics {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let path = req.route().unwrap_or(UNMATCHED_ROUTE).to_owned();
        let method = req.method().as_str().to_owned();

        Box::pin(async move {
            let start = Instant::now();
            self.registry.record(|| {
                metrics::counter!(
                    self.collectors.request_count.clone(),
                    "path" => path.clone(),
                    "method" => method.clone()
                )
                .increment(1);
            });

            let res = next.run(req).await;

            let code = res.status_code().as_u16().to_string();
            let elapsed = start.elapsed().as_secs_f64();
            self.registry.record(|| {
                metrics::counter!(
                    self.collectors.response_count.clone(),
                    "path" => path.clone(),
                    "method" => method.clone(),
                    "code" => code
                )
                .increment(1);
                metrics::histogram!(
                    self.collectors.response_time.clone(),
                    "path" => path,
                    "method" => method
                )
                .record(elapsed);
            });
            res
        })
    }
}
