//! Epoch-based cooperative cancellation
//!
//! Each concurrency group owns an [`Epoch`]. Admitting a run increments the
//! epoch and hands the run a [`RunToken`] remembering the value it was issued
//! with. Any later increment makes the token stale, which the run observes at
//! its next step boundary (or immediately, while waiting on a subprocess).

use tokio::sync::watch;

/// Generation counter of a concurrency group
#[derive(Debug)]
pub struct Epoch {
    tx: watch::Sender<u64>,
}

impl Epoch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Current generation
    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Starts a new generation and returns its token; every older token is
    /// cancelled by this call.
    pub fn issue(&self) -> RunToken {
        self.tx.send_modify(|epoch| *epoch += 1);
        RunToken {
            epoch: self.current(),
            rx: self.tx.subscribe(),
        }
    }

    /// Cancels the holder of the current generation without issuing a new one
    pub fn bump(&self) {
        self.tx.send_modify(|epoch| *epoch += 1);
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::new()
    }
}

/// A run's view of its group's epoch
#[derive(Debug, Clone)]
pub struct RunToken {
    epoch: u64,
    rx: watch::Receiver<u64>,
}

impl RunToken {
    /// A token that can never be cancelled, for runs outside any group
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(0);
        // The receiver keeps its last value once the sender is gone.
        drop(tx);
        Self { epoch: 0, rx }
    }

    /// Generation this token was issued for
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() != self.epoch
    }

    /// Resolves once the token is stale; never resolves for a group that is
    /// gone without having moved on.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() != self.epoch {
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

    #[test]
    fn test_issue_stales_previous_token() {
        let epoch = Epoch::new();
        let first = epoch.issue();
        assert!(!first.is_cancelled());

        let second = epoch.issue();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(second.epoch(), first.epoch() + 1);
    }

    #[test]
    fn test_bump_cancels_current() {
        let epoch = Epoch::new();
        let token = epoch.issue();
        epoch.bump();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_detached_token_never_cancelled() {
        let token = RunToken::detached();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_issue() {
        let epoch = Epoch::new();
        let token = epoch.issue();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        let _next = epoch.issue();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancellation not observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_pending_for_detached() {
        let token = RunToken::detached();
        let result = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(result.is_err());
    }
}
