//! Lifecycle and graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use httpkit::{Error, LifecycleState, Method, Request, Server, StatusCode};
use tokio::net::TcpStream;

mod common;

use common::{raw_client, start};

fn server(delay_ms: u64, timeout_ms: u64) -> Server {
    Server::builder("app")
        .addr("127.0.0.1:0")
        .graceful_shutdown(Duration::from_millis(delay_ms), Duration::from_millis(timeout_ms))
        .build()
        .unwrap()
}

#[tokio::test]
async fn idle_server_walks_through_every_state() {
    let running = start(server(100, 200)).await;
    let lifecycle = running.lifecycle.clone();
    let addr = running.addr;
    assert_eq!(lifecycle.state(), LifecycleState::Running);

    let fired_at = Instant::now();
    assert!(running.shutdown.trigger());

    assert!(lifecycle.wait_for(LifecycleState::Draining).await >= LifecycleState::Draining);
    lifecycle.wait_for(LifecycleState::ShuttingDown).await;
    assert!(fired_at.elapsed() >= Duration::from_millis(100), "{:?}", fired_at.elapsed());

    assert_eq!(lifecycle.wait_for(LifecycleState::Stopped).await, LifecycleState::Stopped);
    assert!(fired_at.elapsed() <= Duration::from_millis(300), "{:?}", fired_at.elapsed());

    running.task.await.unwrap().unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn ready_reports_503_while_draining() {
    let running = start(server(500, 200)).await;
    let client = raw_client();

    let res = client.get(running.url("/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    running.shutdown.trigger();
    running.lifecycle.wait_for(LifecycleState::Draining).await;

    // The listener stays open during the delay.
    let res = client.get(running.url("/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "draining");
    let res = client.get(running.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    running.stop().await;
}

#[tokio::test]
async fn double_trigger_runs_closers_once() {
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closed);
    let failing = Arc::new(AtomicUsize::new(0));
    let failing_counter = Arc::clone(&failing);

    let server = Server::builder("app")
        .addr("127.0.0.1:0")
        .graceful_shutdown(Duration::ZERO, Duration::from_millis(100))
        .closer("counter", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .closer("broken", move || {
            failing_counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::Config("flush failed".into()))
        })
        .build()
        .unwrap();
    let running = start(server).await;

    assert!(running.shutdown.trigger());
    assert!(!running.shutdown.trigger());
    let lifecycle = running.lifecycle.clone();
    let shutdown = running.shutdown.clone();
    running.task.await.unwrap().unwrap();
    assert!(!shutdown.trigger());

    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(failing.load(Ordering::SeqCst), 1, "a failing closer does not stop the others");
}

#[tokio::test]
async fn in_flight_request_finishes_during_shutdown() {
    let mut server = server(0, 2_000);
    server
        .route(Method::GET, "/slow", |_req: Request| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "done"
        })
        .unwrap();
    let running = start(server).await;

    let url = running.url("/slow");
    let request = tokio::spawn(async move { raw_client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.shutdown.trigger();
    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "done");

    running.lifecycle.wait_for(LifecycleState::Stopped).await;
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn graceful_timeout_abandons_stuck_requests() {
    let mut server = server(0, 150);
    server
        .route(Method::GET, "/stuck", |_req: Request| async {
            tokio::time::sleep(Duration::from_secs(20)).await;
            "never"
        })
        .unwrap();
    let running = start(server).await;

    let url = running.url("/stuck");
    let request = tokio::spawn(async move { raw_client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fired_at = Instant::now();
    running.shutdown.trigger();
    running.lifecycle.wait_for(LifecycleState::Stopped).await;
    assert!(fired_at.elapsed() < Duration::from_secs(2), "{:?}", fired_at.elapsed());
    running.task.await.unwrap().unwrap();

    // The connection was torn down without a response.
    assert!(request.await.unwrap().is_err());
}
