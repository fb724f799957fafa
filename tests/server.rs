//! End-to-end tests: a real server on an ephemeral port.

use std::time::Duration;

use httpkit::registry::sample;
use httpkit::{Context, Method, Request, Response, StatusCode};

mod common;

use common::{Capture, builder, is_request_id, raw_client, start};

async fn hello(_req: Request) -> Response {
    Response::text("hello")
}

async fn boom(_req: Request) -> Response {
    panic!("handler blew up")
}

async fn echo_id(req: Request) -> Response {
    let id = req.param("id").unwrap_or("none").to_owned();
    Response::text(id)
}

#[tokio::test]
async fn hello_with_logging_and_metrics() {
    let logs = Capture::default();
    let mut server = builder("e2e-app")
        .logger(logs.dispatch())
        .metrics()
        .build()
        .unwrap();
    server.route(Method::GET, "/hello", hello).unwrap();
    let running = start(server).await;

    let res = raw_client().get(running.url("/hello")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let id = res.headers()["x-request-id"].to_str().unwrap().to_owned();
    assert!(is_request_id(&id), "{id}");
    assert_eq!(res.text().await.unwrap(), "hello");

    let exposition = running.registry.render();
    let labels = [("path", "/hello"), ("method", "GET")];
    assert_eq!(sample(&exposition, "e2e_app_request_count", &labels), Some(1.0));
    assert_eq!(
        sample(&exposition, "e2e_app_response_count", &[("path", "/hello"), ("method", "GET"), ("code", "200")]),
        Some(1.0)
    );

    // The same numbers through the standard endpoint.
    let scraped = raw_client().get(running.url("/metrics")).send().await.unwrap();
    assert!(scraped.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
    let scraped = scraped.text().await.unwrap();
    assert_eq!(sample(&scraped, "e2e_app_request_count", &labels), Some(1.0));

    running.stop().await;

    let out = logs.contents();
    assert!(out.contains("http-server listening"), "{out}");
    assert!(out.contains("path=\"/hello\"") || out.contains("path=/hello"), "{out}");
    assert!(out.contains("status=200"), "{out}");
    assert!(out.contains(&id), "{out}");
}

#[tokio::test]
async fn fallback_panic_and_params() {
    let mut server = builder("app").metrics().build().unwrap();
    server
        .route(Method::GET, "/boom", boom)
        .unwrap()
        .route(Method::GET, "/users/{id}", echo_id)
        .unwrap();
    let running = start(server).await;
    let client = raw_client();

    let res = client.get(running.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().contains_key("x-request-id"));

    let res = client.get(running.url("/boom")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(is_request_id(res.headers()["x-request-id"].to_str().unwrap()));

    let res = client.get(running.url("/users/42")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "42");

    let exposition = running.registry.render();
    assert_eq!(
        sample(&exposition, "app_response_count", &[("path", "/*"), ("code", "404")]),
        Some(1.0)
    );
    assert_eq!(
        sample(&exposition, "app_response_count", &[("path", "/boom"), ("code", "500")]),
        None,
        "a panic unwinds past the metrics layer"
    );

    running.stop().await;
}

#[tokio::test]
async fn unmatched_path_and_method_fall_back_to_404() {
    let logs = Capture::default();
    let mut server = builder("app").logger(logs.dispatch()).build().unwrap();
    server.route(Method::GET, "/hello", hello).unwrap();
    let running = start(server).await;
    let client = raw_client();

    let res = client.post(running.url("/hello")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let id = res.headers()["x-request-id"].to_str().unwrap().to_owned();
    assert!(res.bytes().await.unwrap().is_empty());

    let res = client.get(running.url("/hello/extra")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    running.stop().await;
    let out = logs.contents();
    assert!(out.contains("status=404"), "{out}");
    assert!(out.contains(&id), "{out}");
}

#[tokio::test]
async fn custom_not_found_runs_through_the_chain() {
    let server = builder("app")
        .not_found(|_req: Request| async { (StatusCode::GONE, "gone") })
        .build()
        .unwrap();
    let running = start(server).await;

    let res = raw_client().get(running.url("/old")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GONE);
    assert!(res.headers().contains_key("x-request-id"));

    running.stop().await;
}

#[tokio::test]
async fn standard_endpoints() {
    let doc = std::env::temp_dir().join(format!("httpkit-openapi-{}.json", std::process::id()));
    std::fs::write(&doc, r#"{"openapi":"3.0.0"}"#).unwrap();

    let server = builder("app")
        .openapi(&doc)
        .profiling(true)
        .build()
        .unwrap();
    let running = start(server).await;
    let client = raw_client();

    let res = client.get(running.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().is_empty());

    let res = client.get(running.url("/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(running.url("/openapi.json")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), r#"{"openapi":"3.0.0"}"#);

    let res = client.get(running.url("/debug/pprof/runtime")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let snapshot: serde_json::Value = serde_json::from_slice(&res.bytes().await.unwrap()).unwrap();
    assert!(snapshot["alive_tasks"].is_u64());

    running.stop().await;
    let _ = std::fs::remove_file(doc);
}

#[tokio::test]
async fn profiling_and_openapi_are_off_by_default() {
    let server = builder("app").build().unwrap();
    let running = start(server).await;
    let client = raw_client();

    for path in ["/openapi.json", "/debug/pprof/", "/debug/pprof/runtime"] {
        let res = client.get(running.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
    }

    running.stop().await;
}

#[tokio::test]
async fn slow_handler_hits_the_write_timeout() {
    let logs = Capture::default();
    let mut server = builder("app")
        .timeout(Duration::from_millis(200))
        .logger(logs.dispatch())
        .metrics()
        .build()
        .unwrap();
    server
        .route(Method::GET, "/slow", |_req: Request| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        })
        .unwrap();
    let running = start(server).await;

    let res = raw_client().get(running.url("/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let id = res.headers()["x-request-id"].to_str().unwrap().to_owned();
    assert!(is_request_id(&id), "{id}");

    let exposition = running.registry.render();
    assert_eq!(
        sample(&exposition, "app_response_count", &[("path", "/slow"), ("code", "503")]),
        Some(1.0)
    );

    running.stop().await;
    let out = logs.contents();
    assert!(out.contains("status=503"), "{out}");
    assert!(out.contains(&id), "{out}");
}

#[tokio::test]
async fn handler_context_carries_deadline_and_request_id() {
    let mut server = builder("app")
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    server
        .route(Method::POST, "/ctx", |req: Request| async move {
            let ctx: &Context = req.context();
            let remaining = ctx.remaining().unwrap_or_default();
            format!(
                "{}|{}|{}",
                ctx.request_id().unwrap_or("none"),
                remaining > Duration::from_secs(5),
                req.body().len()
            )
        })
        .unwrap();
    let running = start(server).await;

    let res = raw_client()
        .post(running.url("/ctx"))
        .header("x-request-id", "caller-1")
        .body("abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "caller-1");
    assert_eq!(res.text().await.unwrap(), "caller-1|true|3");

    running.stop().await;
}
