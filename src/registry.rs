//! Metrics registry.
//!
//! Each [`MetricsRegistry`] owns its own Prometheus recorder instead of the
//! process-global one, so two servers in one process (or two tests) never
//! see each other's counters. Collectors are declared once at startup;
//! declaring a name twice is a configuration error.
//!
//! # Collectors registered by [`HttpCollectors`]
//!
//! | Metric | Type | Labels |
//! |---|---|---|
//! | `<prefix>_request_count` | counter | `path`, `method` |
//! | `<prefix>_response_count` | counter | `path`, `method`, `code` |
//! | `<prefix>_response_time` | histogram (seconds) | `path`, `method` |

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use metrics::{describe_counter, describe_histogram, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::error::Error;

/// Latency buckets in seconds: 5ms … 10s.
pub const LATENCY_BUCKETS: [f64; 11] =
    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Content type of the `/metrics` exposition.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectorKind {
    Counter,
    Gauge,
    Histogram,
}

struct Inner {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    collectors: Mutex<HashMap<String, CollectorKind>>,
}

/// A set of named collectors and the recorder behind them. Cheap to clone.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<Inner>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, Error> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(&LATENCY_BUCKETS)
            .map_err(|e| Error::Metrics(e.to_string()))?
            .build_recorder();
        let handle = recorder.handle();
        Ok(Self {
            inner: Arc::new(Inner {
                recorder,
                handle,
                collectors: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Declares a collector. Fails if `name` is already taken.
    pub fn register(&self, name: &str, kind: CollectorKind, help: &str) -> Result<(), Error> {
        let mut collectors = self
            .inner
            .collectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if collectors.contains_key(name) {
            return Err(Error::DuplicateCollector(name.to_owned()));
        }
        collectors.insert(name.to_owned(), kind);
        drop(collectors);

        let name = name.to_owned();
        let help = help.to_owned();
        self.record(|| match kind {
            CollectorKind::Counter => describe_counter!(name, help),
            CollectorKind::Gauge => metrics::describe_gauge!(name, help),
            CollectorKind::Histogram => describe_histogram!(name, help),
        });
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner
            .collectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Runs `f` with this registry as the active `metrics` recorder, so the
    /// `counter!` / `histogram!` macros inside it land here.
    pub fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        with_local_recorder(&self.inner.recorder, f)
    }

    /// Prometheus text exposition of every collector.
    pub fn render(&self) -> String {
        self.inner.handle.render()
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let collectors = self
            .inner
            .collectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MetricsRegistry").field("collectors", &collectors.len()).finish()
    }
}

// ── HTTP collectors ───────────────────────────────────────────────────────────

/// Names of the three HTTP collectors, registered under one prefix.
#[derive(Clone, Debug)]
pub struct HttpCollectors {
    pub request_count: String,
    pub response_count: String,
    pub response_time: String,
}

impl HttpCollectors {
    /// Registers the collectors as `<prefix>_request_count` etc. Dashes in
    /// the prefix become underscores. Registering a prefix twice fails.
    pub fn register(registry: &MetricsRegistry, prefix: &str) -> Result<Self, Error> {
        let prefix = prefix.replace('-', "_");
        let collectors = Self {
            request_count: format!("{prefix}_request_count"),
            response_count: format!("{prefix}_response_count"),
            response_time: format!("{prefix}_response_time"),
        };
        registry.register(
            &collectors.request_count,
            CollectorKind::Counter,
            "The total request count",
        )?;
        registry.register(
            &collectors.response_count,
            CollectorKind::Counter,
            "The total response count",
        )?;
        registry.register(
            &collectors.response_time,
            CollectorKind::Histogram,
            "Response time in seconds",
        )?;
        Ok(collectors)
    }
}

/// Reads one sample from an exposition: the value of the first line of
/// `metric` carrying every `label="value"` pair in `labels`.
pub fn sample(exposition: &str, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let rest = line.strip_prefix(metric)?;
            // `metric_bucket` and friends share the prefix; only exact names.
            let (selector, value) = match rest.strip_prefix('{') {
                Some(labeled) => labeled.split_once('}')?,
                None if rest.starts_with(' ') => ("", rest),
                None => return None,
            };
            let matches = labels
                .iter()
                .all(|(k, v)| selector.split(',').any(|pair| pair == format!("{k}=\"{v}\"")));
            if !matches {
                return None;
            }
            value.trim().parse().ok()
        })
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_collector_is_rejected() {
        let registry = MetricsRegistry::new().unwrap();
        HttpCollectors::register(&registry, "my-app").unwrap();
        let err = HttpCollectors::register(&registry, "my_app").unwrap_err();
        assert!(matches!(err, Error::DuplicateCollector(name) if name == "my_app_request_count"));
    }

    #[test]
    fn registries_are_independent() {
        let a = MetricsRegistry::new().unwrap();
        let b = MetricsRegistry::new().unwrap();
        HttpCollectors::register(&a, "svc").unwrap();
        HttpCollectors::register(&b, "svc").unwrap();

        a.record(|| metrics::counter!("svc_request_count", "path" => "/x").increment(2));

        assert_eq!(sample(&a.render(), "svc_request_count", &[("path", "/x")]), Some(2.0));
        assert_eq!(sample(&b.render(), "svc_request_count", &[("path", "/x")]), None);
    }

    #[test]
    fn sample_matches_exact_metric_and_labels() {
        let text = "\
# TYPE app_request_count counter
app_request_count{path=\"/x\",method=\"GET\"} 3
app_request_count{path=\"/y\",method=\"GET\"} 1
app_response_time_bucket{path=\"/x\",method=\"GET\",le=\"0.005\"} 3
app_up 1
";
        assert_eq!(sample(text, "app_request_count", &[("path", "/x"), ("method", "GET")]), Some(3.0));
        assert_eq!(sample(text, "app_request_count", &[("path", "/y")]), Some(1.0));
        assert_eq!(sample(text, "app_request_count", &[("path", "/z")]), None);
        assert_eq!(sample(text, "app_response_time", &[]), None);
        assert_eq!(sample(text, "app_up", &[]), Some(1.0));
    }
}
