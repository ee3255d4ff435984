//! Shutdown signalling.

use tokio::sync::broadcast;

/// Lifecycle management state.
///
/// Every connection task subscribes to the shutdown broadcast and closes its
/// socket when it fires; the dispatcher worker and HTTP surface do the same.
pub struct LifecycleManager {
    shutdown_tx: broadcast::Sender<()>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        // Capacity 16 provides buffer for multiple slow subscribers during shutdown
        let (shutdown_tx, _) = broadcast::channel(16);
        Self { shutdown_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown. Returns how many subscribers were listening.
    pub fn shutdown(&self) -> usize {
        self.shutdown_tx.send(()).unwrap_or(0)
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
