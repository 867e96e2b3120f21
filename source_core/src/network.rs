//! Network availability monitoring used by network dependent sources.

/// Answers whether the network is currently reachable and lets a source
/// wait for connectivity to come back.
///
/// Sources that need the network to acquire a fix hold their pending query
/// while [`NetworkMonitor::is_available`] is `false` and resume it when
/// [`NetworkMonitor::wait_available`] resolves.
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Returns whether the network is reachable right now.
    fn is_available(&self) -> bool;

    /// Resolves as soon as the network becomes reachable.
    ///
    /// Resolves immediately when the network is already reachable.
    async fn wait_available(&self);
}

/// A [`NetworkMonitor`] reporting the network as permanently reachable.
///
/// Used where no real connectivity tracking is wired up.
pub struct AlwaysAvailable;

#[async_trait::async_trait]
impl NetworkMonitor for AlwaysAvailable {
    fn is_available(&self) -> bool {
        true
    }

    async fn wait_available(&self) {}
}
