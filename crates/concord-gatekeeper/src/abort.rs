//! Cooperative cancellation

use tokio::sync::watch;

/// Sender side of a cancellation pair
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Request cancellation; every linked signal observes it
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver side of a cancellation pair, cheap to clone
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Create a linked handle and signal
    pub fn new() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle { tx }, AbortSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> AbortSignal {
        let (_handle, signal) = Self::new();
        signal
    }

    /// True once cancellation was requested
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is requested
    ///
    /// Never resolves if the handle is dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_is_observed() {
        let (handle, signal) = AbortSignal::new();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });
        handle.abort();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("abort should wake the waiter")
            .unwrap();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn test_never_signal_stays_pending() {
        let signal = AbortSignal::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(waited.is_err());
        assert!(!signal.is_aborted());
    }
}
