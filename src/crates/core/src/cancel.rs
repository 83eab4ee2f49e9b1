//! Cooperative cancellation wired through every stage and worker.

use tokio::sync::watch;

/// Cheap-to-clone handle that lets any worker observe a single cancellation
/// signal. Workers check `is_cancelled()` between items and at suspension
/// points; they do not need to poll a shared mutex.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// Owns the signal; only the coordinator holds one of these. Dropping it
/// does not cancel — call [`cancel`](Self::cancel) explicitly.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> (Self, CancellationToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationToken { rx })
    }

    /// Idempotent: calling this more than once is a no-op after the first.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new().0
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Useful in a `tokio::select!`
    /// alongside a suspension point (subprocess wait, HTTP call, gate acquire).
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|&c| c).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let (source, token) = CancellationSource::new();
        assert!(!source.is_cancelled());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_by_all_clones() {
        let (source, token) = CancellationSource::new();
        let token2 = token.clone();
        source.cancel();
        assert!(token.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let (source, _token) = CancellationSource::new();
        source.cancel();
        source.cancel();
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let (source, mut token) = CancellationSource::new();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        source.cancel();
        handle.await.unwrap();
    }
}
