//! Handle for a long-lived background task with cooperative shutdown.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shutdown signal observed by a background task.
///
/// The task checks [`is_set`](Self::is_set) at the top of each iteration and
/// races [`wait`](Self::wait) against anything that may block.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown was requested.
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested (or the owner went away).
    pub async fn wait(&mut self) {
        // An error means the handle was dropped, which also ends the task.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Owner side of a spawned background task.
pub struct BackgroundTask {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawn `body` with a fresh shutdown signal.
    pub(crate) fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, rx) = watch::channel(false);
        let join = tokio::spawn(body(ShutdownSignal { rx }));
        tracing::debug!(task = name, "background task started");
        Self {
            name,
            shutdown_tx,
            join: Some(join),
        }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::warn!(task = self.name, error = %e, "background task ended abnormally");
            }
        }
        tracing::debug!(task = self.name, "background task stopped");
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
