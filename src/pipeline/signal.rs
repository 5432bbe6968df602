//! Refill signal: the consumer raises it when the queue runs low, the
//! producer waits on it and clears it once it has enqueued new work.
//!
//! The signal latches. Raising an already-raised signal does nothing, so a
//! run of low-queue checks between two producer clears sets it once.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct RefillSignal {
    tx: watch::Sender<bool>,
}

impl RefillSignal {
    /// Create a signal in the given state. The pipeline starts it raised so
    /// the producer's first cycle runs immediately.
    pub fn new(raised: bool) -> Self {
        let (tx, _rx) = watch::channel(raised);
        Self { tx }
    }

    /// Set the signal. Returns `true` only if it was previously clear.
    pub fn raise(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    /// Clear the signal, re-arming the next `raise`.
    pub fn clear(&self) {
        self.tx.send_if_modified(|raised| std::mem::replace(raised, false));
    }

    #[cfg(test)]
    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is raised. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}
