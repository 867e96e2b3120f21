//! Helpers shared by the source tests across the workspace.

use crate::network::NetworkMonitor;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::time::timeout;

/// Waits for the next event on a broadcast receiver.
///
/// # Panics
///
/// Panics if the channel closes or no event arrives within `duration`.
pub async fn next_event<T: Clone>(
    rx: &mut tokio::sync::broadcast::Receiver<T>,
    duration: std::time::Duration,
) -> T {
    match timeout(duration, rx.recv()).await {
        Ok(Ok(event)) => event,
        Ok(Err(e)) => panic!("Event channel closed while waiting for an event. Error: {e}"),
        Err(_) => panic!("Failed to receive an event within {duration:?}"),
    }
}

/// Asserts that no event arrives on a broadcast receiver within `duration`.
///
/// # Panics
///
/// Panics if an event is received before the duration elapsed.
pub async fn expect_no_event<T: Clone + std::fmt::Debug>(
    rx: &mut tokio::sync::broadcast::Receiver<T>,
    duration: std::time::Duration,
) {
    if let Ok(Ok(event)) = timeout(duration, rx.recv()).await {
        panic!("Received unexpected event {event:?}");
    }
}

/// A manually switchable [`NetworkMonitor`] for tests and the simulated
/// backend.
pub struct FakeNetworkMonitor {
    available: AtomicBool,
    notify: Notify,
}

impl FakeNetworkMonitor {
    pub fn new(available: bool) -> FakeNetworkMonitor {
        FakeNetworkMonitor {
            available: AtomicBool::new(available),
            notify: Notify::new(),
        }
    }

    /// Switches the reported availability and wakes pending waiters when
    /// the network became reachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            self.notify.notify_waiters();
        }
    }
}

#[async_trait::async_trait]
impl NetworkMonitor for FakeNetworkMonitor {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn wait_available(&self) {
        loop {
            let notified = self.notify.notified();
            if self.available.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}
