//! External network-reachability signal.
//!
//! The session does not probe the network itself.  The embedding
//! application owns a [`Connectivity`] handle and reports changes; the
//! session reads the current value before each connection attempt and
//! listens for "restored" while it waits to reconnect.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared online/offline flag.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity {
    /// Starts online.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Mark the network as unreachable.  Connection attempts are skipped
    /// until [`restored`](Self::restored) is called.
    pub fn set_offline(&self) {
        self.tx.send_replace(false);
    }

    /// Report that the network is reachable again.  Every call notifies
    /// listeners, even when the flag was already set.
    pub fn restored(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolve on the next "restored" notification, or never when `listening`
/// is false.
pub(crate) async fn wait_restored(rx: &mut watch::Receiver<bool>, listening: bool) {
    if !listening {
        return std::future::pending().await;
    }
    loop {
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
        if *rx.borrow_and_update() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_online() {
        assert!(Connectivity::new().is_online());
    }

    #[test]
    fn offline_then_restored() {
        let c = Connectivity::new();
        c.set_offline();
        assert!(!c.is_online());
        c.clone().restored();
        assert!(c.is_online());
    }

    #[tokio::test]
    async fn restored_wakes_listener_even_when_already_online() {
        let c = Connectivity::new();
        let mut rx = c.subscribe();
        c.restored();
        tokio::time::timeout(Duration::from_secs(1), wait_restored(&mut rx, true))
            .await
            .expect("listener should wake");
    }

    #[tokio::test(start_paused = true)]
    async fn going_offline_does_not_wake_listener() {
        let c = Connectivity::new();
        let mut rx = c.subscribe();
        c.set_offline();
        let woke = tokio::time::timeout(Duration::from_secs(1), wait_restored(&mut rx, true)).await;
        assert!(woke.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn detached_listener_never_wakes() {
        let c = Connectivity::new();
        let mut rx = c.subscribe();
        c.restored();
        let woke = tokio::time::timeout(Duration::from_secs(1), wait_restored(&mut rx, false)).await;
        assert!(woke.is_err());
    }
}
