//! Distributed tracing backend.
//!
//! [`Tracer`] wraps an OpenTelemetry SDK provider and the W3C trace-context
//! propagator (`traceparent` / `tracestate` headers). The server side
//! extracts a parent from inbound headers; the client side injects the
//! active span into outbound ones. Export is whatever the provider was
//! built with: [`Tracer::new`] records spans without exporting them, use
//! [`Tracer::from_provider`] to plug in an exporter.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _, TracerProvider};
use opentelemetry::{Context as TraceContext, KeyValue};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::Error;

type SdkTracer = <SdkTracerProvider as TracerProvider>::Tracer;

struct Inner {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    propagator: TraceContextPropagator,
    closed: AtomicBool,
}

/// Span factory and header propagator. Cheap to clone.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<Inner>,
}

impl Tracer {
    /// A tracer for `service_name` whose spans are sampled but not exported.
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let provider = SdkTracerProvider::builder()
            .with_resource(Resource::builder().with_service_name(service_name.clone()).build())
            .build();
        Self::from_provider(provider, service_name)
    }

    pub fn from_provider(provider: SdkTracerProvider, service_name: impl Into<Cow<'static, str>>) -> Self {
        let tracer = provider.tracer(service_name);
        Self {
            inner: Arc::new(Inner {
                provider,
                tracer,
                propagator: TraceContextPropagator::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Reads a parent context from `headers`. Missing or malformed headers
    /// yield an empty context, from which a new root span starts.
    pub fn extract(&self, headers: &HeaderMap) -> TraceContext {
        self.inner.propagator.extract(&HeaderExtractor(headers))
    }

    /// Writes the span of `cx` into `headers`.
    pub fn inject(&self, cx: &TraceContext, headers: &mut HeaderMap) {
        self.inner.propagator.inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Starts a span as a child of `parent`. It ends when the guard drops.
    pub fn start_span(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: &TraceContext,
    ) -> SpanGuard {
        let span = self
            .inner
            .tracer
            .span_builder(name)
            .with_kind(kind)
            .start_with_context(&self.inner.tracer, parent);
        SpanGuard { cx: parent.with_span(span) }
    }

    /// Flushes and shuts the provider down. Later calls do nothing.
    pub fn close(&self) -> Result<(), Error> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.provider.shutdown().map_err(|e| Error::Tracer(e.to_string()))
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// An active span. Ending happens on drop, so a span is also closed when
/// the future holding it unwinds or is cancelled.
pub struct SpanGuard {
    cx: TraceContext,
}

impl SpanGuard {
    /// Context carrying this span, to hand to children or to inject.
    pub fn context(&self) -> &TraceContext {
        &self.cx
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

// ── Header carriers ───────────────────────────────────────────────────────────

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(&value))
        {
            self.0.insert(name, value);
        }
    }
}
