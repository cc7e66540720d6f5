//! Structured task supervision.
//!
//! The epoch driver, the resync controller and the network listener are
//! owned, cancellable tasks rather than fire-and-forget threads. The
//! supervisor tracks them with a `TaskTracker`, signals shutdown through
//! a shared `CancellationToken`, and bounds the wait for them to drain.
//! A critical task failing outside shutdown cancels everything else.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Bound on graceful shutdown before giving up on stragglers.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result type for supervised tasks.
pub type SupervisedResult = Result<(), anyhow::Error>;

/// Supervises the node's background tasks.
#[derive(Clone)]
pub struct NodeSupervisor {
    tracker: TaskTracker,
    token: CancellationToken,
    shutting_down: Arc<AtomicBool>,
    shutdown_timeout: Duration,
}

impl Default for NodeSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeSupervisor {
    /// Create a supervisor with the default shutdown bound.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Create a supervisor with a custom shutdown bound.
    pub fn with_timeout(shutdown_timeout: Duration) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
            shutting_down: Arc::new(AtomicBool::new(false)),
            shutdown_timeout,
        }
    }

    /// The token tasks should observe at every sleep/wait boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Spawn a supervised task.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = SupervisedResult> + Send + 'static,
    {
        let shutting_down = self.shutting_down.clone();
        self.tracker.spawn(async move {
            match future.await {
                Ok(()) => info!(task = name, "task finished"),
                Err(err) if shutting_down.load(Ordering::SeqCst) => {
                    info!(task = name, %err, "task stopped during shutdown")
                }
                Err(err) => error!(task = name, %err, "task failed"),
            }
        });
    }

    /// Spawn a task whose unexpected failure brings the node down.
    pub fn spawn_critical<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = SupervisedResult> + Send + 'static,
    {
        let shutting_down = self.shutting_down.clone();
        let token = self.token.clone();
        self.tracker.spawn(async move {
            match future.await {
                Ok(()) => info!(task = name, "critical task finished"),
                Err(err) if shutting_down.load(Ordering::SeqCst) => {
                    info!(task = name, %err, "critical task stopped during shutdown")
                }
                Err(err) => {
                    error!(task = name, %err, "critical task failed; shutting down");
                    token.cancel();
                }
            }
        });
    }

    /// Initiate graceful shutdown and wait for all tasks, bounded by the
    /// shutdown timeout.
    pub async fn shutdown(&self) -> Result<(), ShutdownTimeout> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            warn!("shutdown already in progress");
            return Ok(());
        }

        info!("initiating graceful shutdown");
        self.tracker.close();
        self.token.cancel();

        match tokio::time::timeout(self.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("all tasks terminated");
                Ok(())
            }
            Err(_) => {
                error!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "shutdown timeout exceeded; tasks may still be running"
                );
                Err(ShutdownTimeout)
            }
        }
    }

    /// Number of tracked tasks (approximate).
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }
}

/// Shutdown exceeded its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeout;

impl std::fmt::Display for ShutdownTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("shutdown timeout exceeded")
    }
}

impl std::error::Error for ShutdownTimeout {}
