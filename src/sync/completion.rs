//! One-shot cross-connection completion signal.
//!
//! A backend connection blocks on a [`Completion`] until the client has
//! finished a phase transition it does not directly control. The cell is
//! single-assignment: the first `complete` wins, later attempts are no-ops.
//! Disconnect paths complete with [`Outcome::Abandoned`] so a waiter never
//! hangs on a signal that can no longer arrive.

use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Terminal value of a completion cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The client-side transition finished; the waiter may promote.
    Finished,
    /// The transition can no longer finish (disconnect); the waiter must
    /// treat the migration as abandoned.
    Abandoned,
}

/// Single-assignment completion cell, shared by completer and waiter.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    outcome: Mutex<Option<Outcome>>,
    notify: Notify,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outcome. Returns `true` if this call won the assignment;
    /// a second completion attempt is a no-op and returns `false`.
    pub fn complete(&self, outcome: Outcome) -> bool {
        {
            let mut slot = self.inner.outcome.lock().expect("completion lock");
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Non-blocking read of the outcome, if set.
    pub fn peek(&self) -> Option<Outcome> {
        *self.inner.outcome.lock().expect("completion lock")
    }

    /// Wait until the cell is completed.
    pub async fn wait(&self) -> Outcome {
        loop {
            // Register interest before checking, so a completion that lands
            // between the check and the await still wakes us.
            let notified = self.inner.notify.notified();
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_completion_wins() {
        let cell = Completion::new();
        assert!(cell.complete(Outcome::Finished));
        assert!(!cell.complete(Outcome::Abandoned));
        assert_eq!(cell.peek(), Some(Outcome::Finished));
    }

    #[tokio::test]
    async fn waiter_unblocks_on_completion() {
        let cell = Completion::new();
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        cell.complete(Outcome::Finished);
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .unwrap();
        assert_eq!(outcome, Outcome::Finished);
    }

    #[tokio::test]
    async fn wait_after_completion_returns_immediately() {
        let cell = Completion::new();
        cell.complete(Outcome::Abandoned);
        let outcome = tokio::time::timeout(Duration::from_millis(100), cell.wait())
            .await
            .expect("no wait on a completed cell");
        assert_eq!(outcome, Outcome::Abandoned);
    }

    #[tokio::test]
    async fn duplicate_completion_does_not_change_outcome() {
        let cell = Completion::new();
        cell.complete(Outcome::Finished);
        cell.complete(Outcome::Abandoned);
        assert_eq!(cell.wait().await, Outcome::Finished);
    }
}
