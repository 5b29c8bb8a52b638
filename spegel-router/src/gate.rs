use std::sync::RwLock;

use tokio::sync::watch;

/// A one-shot-turned-reusable broadcast readiness signal.
///
/// Readers clone a receiver and await it transitioning to `true`; writers flip the gate open or
/// closed. Unlike a plain `tokio::sync::Notify`, a `Gate` lets a reader that subscribes *after*
/// the gate opened still observe the open state immediately, which is the behavior `Ready()`
/// needs: a late caller must not block forever waiting for an edge it missed.
///
/// The state and its channel are protected by a single `RwLock` so that "read current state" and
/// "subscribe to future state" are never torn apart by a concurrent toggle.
pub struct Gate {
    inner: RwLock<watch::Sender<bool>>,
}

impl Gate {
    pub fn new() -> Self {
        Gate {
            inner: RwLock::new(watch::channel(false).0),
        }
    }

    pub fn is_open(&self) -> bool {
        *self.inner.read().unwrap().borrow()
    }

    pub fn open(&self) {
        let _ = self.inner.write().unwrap().send(true);
    }

    pub fn close(&self) {
        let _ = self.inner.write().unwrap().send(false);
    }

    /// Wait until the gate is open. Returns immediately if it already is.
    pub async fn wait_open(&self) {
        let mut rx = self.inner.read().unwrap().subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Gate::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn late_subscriber_sees_open_state_immediately() {
        let gate = Arc::new(Gate::new());
        gate.open();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_open())
            .await
            .expect("wait_open should return immediately once gate is open");
    }

    #[tokio::test]
    async fn waiter_unblocks_when_opened_later() {
        let gate = Arc::new(Gate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_open().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.open();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter task should complete")
            .unwrap();
    }
}
