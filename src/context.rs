//! Request-scoped context.
//!
//! A [`Context`] travels with every [`Request`](crate::Request) and into the
//! [`Client`](crate::Client) for outbound calls. It is immutable: each
//! `with_*` method returns a child that shares nothing mutable with its
//! parent, so a middleware can enrich the context for the handlers it wraps
//! without affecting anyone holding the original.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::lifecycle::Shutdown;

#[derive(Clone, Default)]
struct Fields {
    request_id: Option<Arc<str>>,
    deadline: Option<Instant>,
    cancellation: Option<Shutdown>,
    trace: Option<opentelemetry::Context>,
    values: HashMap<Arc<str>, Arc<str>>,
}

#[derive(Clone, Default)]
pub struct Context {
    fields: Arc<Fields>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.fields.request_id.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.fields.deadline
    }

    /// Time left until the deadline; `None` without a deadline, zero once
    /// it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.fields.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// `true` once the server gave up on in-flight requests.
    pub fn is_cancelled(&self) -> bool {
        self.fields.cancellation.as_ref().is_some_and(Shutdown::is_triggered)
    }

    /// Resolves when the context is cancelled. Never resolves for a context
    /// without a cancellation token.
    pub async fn cancelled(&self) {
        match &self.fields.cancellation {
            Some(token) => token.triggered().await,
            None => std::future::pending().await,
        }
    }

    /// The OpenTelemetry context of the active span, if tracing is enabled.
    pub fn trace(&self) -> Option<&opentelemetry::Context> {
        self.fields.trace.as_ref()
    }

    /// A caller-supplied value, e.g. an auth token forwarded to a client.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.fields.values.get(key).map(|v| &**v)
    }

    pub fn with_request_id(&self, id: impl Into<Arc<str>>) -> Self {
        self.derive(|f| f.request_id = Some(id.into()))
    }

    /// Sets the deadline. A parent deadline that is earlier wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.fields.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        self.derive(|f| f.deadline = Some(deadline))
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(&self, token: Shutdown) -> Self {
        self.derive(|f| f.cancellation = Some(token))
    }

    pub fn with_trace(&self, trace: opentelemetry::Context) -> Self {
        self.derive(|f| f.trace = Some(trace))
    }

    pub fn with_value(&self, key: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        self.derive(|f| {
            f.values.insert(key.into(), value.into());
        })
    }

    fn derive(&self, apply: impl FnOnce(&mut Fields)) -> Self {
        let mut fields = (*self.fields).clone();
        apply(&mut fields);
        Self { fields: Arc::new(fields) }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.fields.request_id)
            .field("deadline", &self.fields.deadline)
            .field("cancelled", &self.is_cancelled())
            .field("traced", &self.fields.trace.is_some())
            .field("values", &self.fields.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_never_touch_the_parent() {
        let parent = Context::new().with_value("tenant", "a");
        let child = parent.with_value("tenant", "b").with_request_id("req-1");

        assert_eq!(parent.value("tenant"), Some("a"));
        assert_eq!(parent.request_id(), None);
        assert_eq!(child.value("tenant"), Some("b"));
        assert_eq!(child.request_id(), Some("req-1"));
    }

    #[test]
    fn earlier_parent_deadline_is_kept() {
        let now = Instant::now();
        let parent = Context::new().with_deadline(now + Duration::from_secs(1));
        let child = parent.with_deadline(now + Duration::from_secs(10));
        assert_eq!(child.deadline(), Some(now + Duration::from_secs(1)));

        let tighter = parent.with_deadline(now + Duration::from_millis(10));
        assert_eq!(tighter.deadline(), Some(now + Duration::from_millis(10)));
    }

    #[test]
    fn cancellation_follows_the_token() {
        let token = Shutdown::new();
        let ctx = Context::new().with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.trigger();
        assert!(ctx.is_cancelled());
        assert!(!Context::new().is_cancelled());
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let ctx = Context::new().with_deadline(Instant::now() - Duration::from_millis(5));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        assert_eq!(Context::new().remaining(), None);
    }
}
