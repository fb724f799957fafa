#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpkit::{Client, Error, Lifecycle, MetricsRegistry, Server, ServerBuilder, Shutdown};
use tokio::task::JoinHandle;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;

/// A server serving on an ephemeral port in a background task.
pub struct Running {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub lifecycle: Lifecycle,
    pub registry: MetricsRegistry,
    pub task: JoinHandle<Result<(), Error>>,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> Client {
        Client::builder("tests", &format!("http://{}/", self.addr)).build().unwrap()
    }

    /// Fires the shutdown token and waits for `serve` to return.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

/// Ephemeral port, no drain delay.
pub fn builder(app_name: &str) -> ServerBuilder {
    Server::builder(app_name)
        .addr("127.0.0.1:0")
        .graceful_shutdown(Duration::ZERO, Duration::from_millis(500))
}

pub async fn start(server: Server) -> Running {
    let listening = server.listen().await.expect("listen");
    let addr = listening.local_addr();
    let lifecycle = listening.lifecycle();
    let registry = listening.registry().clone();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(listening.serve(shutdown.clone()));
    Running { addr, shutdown, lifecycle, registry, task }
}

/// Plain reqwest client; no connection reuse so each request sees the
/// server's current state.
pub fn raw_client() -> reqwest::Client {
    reqwest::Client::builder().pool_max_idle_per_host(0).no_proxy().build().unwrap()
}

/// In-memory log sink.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn dispatch(&self) -> Dispatch {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish();
        Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'w> MakeWriter<'w> for Capture {
    type Writer = Capture;

    fn make_writer(&'w self) -> Self::Writer {
        self.clone()
    }
}

/// `<prefix>-<6 digits>` with a non-blank prefix.
pub fn is_request_id(id: &str) -> bool {
    match id.rsplit_once('-') {
        Some((prefix, seq)) => {
            !prefix.is_empty()
                && !prefix.contains(char::is_whitespace)
                && seq.len() == 6
                && seq.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
