//! Host for long-running service processes with graceful shutdown.
//!
//! The runner executes its registered processes concurrently until one
//! fails or a shutdown signal (SIGINT/SIGTERM) arrives, then cancels the
//! shared token and runs every closer under a timeout. The process exits
//! with code 0 after a clean shutdown and 1 when a process failed.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A long-running process. Receives the shared cancellation token and
/// runs until finished or cancelled.
pub type Process = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Cleanup executed after all processes stop, regardless of outcome.
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

const DEFAULT_CLOSER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServiceRunner {
    processes: Vec<Process>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for ServiceRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRunner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: DEFAULT_CLOSER_TIMEOUT,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Register a process. Processes run concurrently; the first failure
    /// cancels the rest.
    pub fn with_process<F, Fut>(mut self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.processes.push(Box::new(|token| Box::pin(process(token))));
        self
    }

    /// Register a closer. All closers attempt to run even when some fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally controlled cancellation token instead of the
    /// runner's own.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until completion or shutdown, then exit the process.
    pub async fn run(self) {
        let token = self.cancellation_token;
        let mut processes = JoinSet::new();

        for process in self.processes {
            let process_token = token.clone();
            processes.spawn(async move { process(process_token).await });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(joined) = processes.join_next().await {
            match joined {
                Ok(Ok(())) => {
                    tracing::debug!("service process completed");
                }
                Ok(Err(err)) => {
                    tracing::error!(error = %format!("{err:#}"), "service process failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    token.cancel();
                }
                Err(err) => {
                    tracing::error!(error = %err, "service process panicked");
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        // Drain whatever is still running after cancellation.
        processes.shutdown().await;

        if !self.closers.is_empty() {
            tracing::info!(timeout = ?self.closer_timeout, "running closers");
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                tracing::error!(timeout = ?self.closer_timeout, "closers timed out");
            }
        }

        if let Some(err) = first_error {
            tracing::error!(error = %format!("{err:#}"), "service exiting with error");
            std::process::exit(1);
        }
        tracing::info!("service exiting normally");
        std::process::exit(0);
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let interrupt_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received interrupt signal");
                interrupt_token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to install the interrupt handler");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received terminate signal");
                token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to install the terminate handler");
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut set = JoinSet::new();
    for closer in closers {
        set.spawn(async move { closer().await });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(err)) => tracing::error!(error = %format!("{err:#}"), "closer failed"),
            Err(err) => tracing::error!(error = %err, "closer panicked"),
        }
    }
}
