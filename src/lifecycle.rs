//! Lifecycle states and the shutdown token.
//!
//! # States
//!
//! ```text
//! Created ──listen()──▶ Running ──token fires──▶ Draining
//!                                                   │ graceful delay
//!                                                   ▼
//!                        Stopped ◀──drained or──  ShuttingDown
//!                                   timed out
//! ```
//!
//! `Draining` exists for load balancers: the process keeps accepting while
//! `/ready` reports 503, so traffic moves away before the listener closes.
//!
//! # Kubernetes
//!
//! On pod termination Kubernetes sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` before SIGKILL. Keep
//! `graceful_delay + graceful_timeout` below that period.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

// ── Shutdown token ────────────────────────────────────────────────────────────

/// One-shot cancellation token.
///
/// Clones share the same token. The first [`trigger`](Shutdown::trigger)
/// flips it; later calls are no-ops. Waiters that subscribe after the token
/// fired resolve immediately.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the token. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token has fired.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// A token that fires on the first SIGTERM or Ctrl-C the process gets.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn on_os_signals() -> Self {
        let shutdown = Self::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            os_signal().await;
            info!("shutdown signal received");
            token.trigger();
        });
        shutdown
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdown").field("triggered", &self.is_triggered()).finish()
    }
}

/// Resolves on SIGTERM (Unix) or Ctrl-C. If a handler cannot be installed
/// that arm never resolves and the other one still works.
async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

// ── Lifecycle state ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Created,
    Running,
    Draining,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created      => "created",
            Self::Running      => "running",
            Self::Draining     => "draining",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped      => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a server's lifecycle state.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    rx: watch::Receiver<LifecycleState>,
}

impl Lifecycle {
    pub fn state(&self) -> LifecycleState {
        *self.rx.borrow()
    }

    /// Waits until the server reaches `state` or any later one.
    pub async fn wait_for(&self, state: LifecycleState) -> LifecycleState {
        let mut rx = self.rx.clone();
        if let Ok(reached) = rx.wait_for(|s| *s >= state).await {
            return *reached;
        }
        // Sender gone: the server was dropped, report whatever it left behind.
        *rx.borrow()
    }
}

/// Writer side, owned by the server.
#[derive(Clone)]
pub(crate) struct StateCell {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Created);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn set(&self, state: LifecycleState) {
        self.tx.send_replace(state);
    }

    pub(crate) fn watch(&self) -> Lifecycle {
        Lifecycle { rx: self.tx.subscribe() }
    }
}
