//! Root cancellation signal shared by the run loop and in-flight tool calls.

use tokio::sync::watch;

/// Clonable cancellation token.
///
/// Cloned into every [`ToolContext`](crate::tools::ToolContext) so a suspended
/// handler can observe shutdown and abort promptly instead of leaving the peer
/// waiting past the grace timeout.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender, receiver }
    }

    /// Signal shutdown. Idempotent.
    pub fn trigger(&self) {
        // Receivers held by clones keep the channel open, so send cannot fail
        // while any token exists.
        let _ = self.sender.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once shutdown is triggered. Returns immediately if it already was.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // wait_for returns Err only when the sender is dropped; our clone of
        // the sender outlives the wait.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_observed_by_clone() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.trigger();
        assert!(clone.is_cancelled());
        // Does not hang once triggered.
        tokio::time::timeout(Duration::from_millis(100), clone.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_wakes_pending_waiter() {
        let token = ShutdownToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.trigger();

        let observed = tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(observed);
    }
}
