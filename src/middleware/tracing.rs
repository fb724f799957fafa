//! Server-side distributed tracing.

use opentelemetry::KeyValue;
use opentelemetry::trace::SpanKind;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::tracer::Tracer;

/// Starts a server span per request, named `"<METHOD> <path>"`, as a child
/// of whatever trace context the caller sent. The span is exposed to the
/// handler through [`Context::trace`](crate::Context::trace) and ends when
/// the inner handler returns, panics or is dropped.
pub struct Tracing {
    tracer: Tracer,
}

impl Tracing {
    pub fn new(tracer: Tracer) -> Self {
        Self { tracer }
    }
}

impl Middleware for Tracing {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a> {
        let parent = self.tracer.extract(req.headers());
        let span = self.tracer.start_span(
            format!("{} {}", req.method(), req.path()),
            SpanKind::Server,
            &parent,
        );
        span.set_attribute(KeyValue::new("http.request.method", req.method().to_string()));
        span.set_attribute(KeyValue::new("url.path", req.path().to_owned()));
        if let Some(id) = req.context().request_id() {
            span.set_attribute(KeyValue::new("request.id", id.to_owned()));
        }

        let ctx = req.context().with_trace(span.context().clone());
        let req = req.with_context(ctx);

        Box::pin(async move {
            let res = next.run(req).await;
            span.set_attribute(KeyValue::new(
                "http.response.status_code",
                i64::from(res.status_code().as_u16()),
            ));
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use opentelemetry::trace::TraceContextExt;

    use super::*;
    use crate::Response;
    use crate::middleware::Chain;
    use crate::middleware::testing::{get, request};

    async fn echo_trace_id(req: Request) -> Response {
        let id = req
            .context()
            .trace()
            .map(|cx| cx.span().span_context().trace_id().to_string())
            .unwrap_or_default();
        Response::text(id)
    }

    #[tokio::test]
    async fn handler_sees_inbound_trace() {
        let endpoint = Chain::new().with(Tracing::new(Tracer::new("test"))).wrap(echo_trace_id);
        let res = endpoint
            .call(request(
                Method::GET,
                "/x",
                &[("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")],
            ))
            .await;
        assert_eq!(res.body(), b"4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[tokio::test]
    async fn absent_parent_is_not_an_error() {
        let endpoint = Chain::new().with(Tracing::new(Tracer::new("test"))).wrap(echo_trace_id);
        let res = endpoint.call(get("/x")).await;
        assert_eq!(res.status_code(), http::StatusCode::OK);
        assert_eq!(res.body().len(), 32);
        assert_ne!(res.body(), b"00000000000000000000000000000000");
    }
}
