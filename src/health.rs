//! Standard endpoints installed by the server at listen time.
//!
//! | Path | Answer |
//! |---|---|
//! | `GET /health` | `200`, empty body. If the process answers at all it is alive. |
//! | `GET /ready` | `200` while running, `503` once the server is draining. |
//! | `GET /metrics` | Prometheus text exposition of the server's registry. |
//! | `GET /openapi.json` | The configured OpenAPI document, when one is set. |
//! | `GET /debug/pprof/` | Index of runtime profiles, when profiling is on. |
//! | `GET /debug/pprof/runtime` | Tokio runtime snapshot as JSON. |
//!
//! Kubernetes liveness probes go to `/health`, readiness probes to `/ready`.
//! The readiness answer flips during the graceful delay, which is what
//! gives the load balancer time to stop routing before the listener closes.

use std::path::PathBuf;
use std::sync::Arc;

use http::StatusCode;
use tracing::warn;

use crate::handler::Handler;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::registry::{EXPOSITION_CONTENT_TYPE, MetricsRegistry};
use crate::{Request, Response};

pub const HEALTH_PATH: &str = "/health";
pub const READY_PATH: &str = "/ready";
pub const METRICS_PATH: &str = "/metrics";
pub const OPENAPI_PATH: &str = "/openapi.json";
pub const PPROF_INDEX_PATH: &str = "/debug/pprof/";
pub const PPROF_RUNTIME_PATH: &str = "/debug/pprof/runtime";

/// Liveness probe.
pub async fn health(_req: Request) -> Response {
    Response::status(StatusCode::OK)
}

/// Readiness probe backed by the server's lifecycle.
pub(crate) fn ready(lifecycle: Lifecycle) -> impl Handler + use<> {
    move |_req: Request| {
        let state = lifecycle.state();
        async move {
            if state == LifecycleState::Running {
                Response::text("ready")
            } else {
                Response::builder()
                    .status(StatusCode::SERVICE_UNAVAILABLE)
                    .text(state.as_str())
            }
        }
    }
}

pub(crate) fn metrics(registry: MetricsRegistry) -> impl Handler + use<> {
    move |_req: Request| {
        let body = registry.render();
        async move { Response::builder().bytes(EXPOSITION_CONTENT_TYPE, body) }
    }
}

/// Serves the file at `path` as JSON. Read on every request so a
/// redeployed document is picked up without a restart.
pub(crate) fn openapi(path: PathBuf) -> impl Handler + use<> {
    let path: Arc<PathBuf> = Arc::new(path);
    move |_req: Request| {
        let path = Arc::clone(&path);
        async move {
            match tokio::fs::read(&*path).await {
                Ok(doc) => Response::json(doc),
                Err(e) => {
                    warn!(path = %path.display(), "openapi document unavailable: {e}");
                    Response::status(StatusCode::NOT_FOUND)
                }
            }
        }
    }
}

pub(crate) async fn pprof_index(_req: Request) -> Response {
    Response::text("runtime - tokio runtime snapshot (JSON)\n")
}

pub(crate) async fn pprof_runtime(_req: Request) -> Response {
    let handle = tokio::runtime::Handle::current();
    let metrics = handle.metrics();
    let snapshot = serde_json::json!({
        "flavor": format!("{:?}", handle.runtime_flavor()),
        "workers": metrics.num_workers(),
        "alive_tasks": metrics.num_alive_tasks(),
        "global_queue_depth": metrics.global_queue_depth(),
    });
    Response::json(snapshot.to_string())
}
