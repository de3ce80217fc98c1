//! Shutdown signaling between the pipeline and its workers.

use tokio::sync::watch;

/// Sending half of the shutdown channel.
///
/// Signaling shutdown is idempotent; workers that already exited simply
/// never observe it.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals all workers to begin an orderly shutdown.
    pub fn shutdown(&self) {
        // Receivers may already be gone when the pipeline finished on its
        // own; that is not an error.
        let _ = self.0.send(true);
    }
}

/// Receiving half of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Completes once shutdown has been signaled.
    pub async fn signaled(&mut self) {
        // An error means the sender was dropped without signaling, which
        // only happens when the pipeline itself is being torn down.
        let _ = self.0.wait_for(|signaled| *signaled).await;
    }

    /// Returns true if shutdown has been signaled.
    pub fn is_signaled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Creates a connected shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_reaches_all_receivers() {
        let (tx, rx) = create_shutdown_channel();
        let mut second = rx.clone();
        let mut first = rx;

        assert!(!first.is_signaled());
        tx.shutdown();

        first.signaled().await;
        second.signaled().await;
        assert!(first.is_signaled());
    }
}
