//! Shutdown coordination for the proxy.
//!
//! # Design Decisions
//! - The signal is latched: a listener taken after the trigger still
//!   resolves, so a SIGTERM racing the bind cannot leave the server running
//! - Dropping every [`Shutdown`] handle counts as a trigger

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle used to request a graceful stop of the proxy server.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

/// One-shot view of a [`Shutdown`], handed to the server's serve loop.
#[derive(Debug)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of serve loops still waiting on this handle.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger once `signal` resolves, from a background task.
    pub fn trigger_on<F>(&self, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.clone();
        tokio::spawn(async move {
            signal.await;
            tracing::info!(listeners = shutdown.listener_count(), "Shutdown requested");
            shutdown.trigger();
        })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    /// Resolve once shutdown has been requested or every handle is gone.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_trigger_reaches_every_listener() {
        let shutdown = Shutdown::new();
        let a = shutdown.listener();
        let b = shutdown.clone().listener();
        assert_eq!(shutdown.listener_count(), 2);

        shutdown.trigger();

        timeout(WAIT, a.wait()).await.unwrap();
        timeout(WAIT, b.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_listener_taken_after_trigger_resolves() {
        let shutdown = Shutdown::default();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());

        timeout(WAIT, shutdown.listener().wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_untriggered_listener_stays_pending() {
        let shutdown = Shutdown::new();
        let listener = shutdown.listener();
        assert!(timeout(Duration::from_millis(50), listener.wait()).await.is_err());
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_dropping_all_handles_releases_listener() {
        let shutdown = Shutdown::new();
        let listener = shutdown.listener();
        drop(shutdown);
        timeout(WAIT, listener.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_on_external_signal() {
        let shutdown = Shutdown::new();
        let listener = shutdown.listener();
        let (tx, rx) = oneshot::channel::<()>();

        let task = shutdown.trigger_on(async move {
            let _ = rx.await;
        });
        assert!(!shutdown.is_triggered());

        tx.send(()).unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(shutdown.is_triggered());
        timeout(WAIT, listener.wait()).await.unwrap();
    }
}
