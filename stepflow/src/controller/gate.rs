//! The "permitted to proceed" gate between controller and stepper.

use tokio::sync::watch;

/// A boolean gate with waiters.
///
/// Opening releases every current and future waiter until the gate is
/// closed again. The gate is never serialized; a restored controller
/// always starts with a fresh, closed gate.
#[derive(Debug)]
pub struct RunGate {
    tx: watch::Sender<bool>,
}

impl Default for RunGate {
    fn default() -> Self {
        Self::closed()
    }
}

impl RunGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn closed() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Opens the gate, releasing waiters.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Closes the gate; later waiters block until it is reopened.
    pub fn close(&self) {
        self.tx.send_replace(false);
    }

    /// Returns whether the gate is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspends until the gate is open. Returns immediately if it already is.
    pub async fn wait_open(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|open| *open).await;
    }
}
