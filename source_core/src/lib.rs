//! Core contract shared by every location source.
//!
//! Provides the [`SourceCore`] base that concrete sources embed and the
//! [`LocationSource`] trait through which clients drive them.

use common::accuracy::AccuracyLevel;
use common::location::Location;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub mod network;
pub mod test_helper;

/// A thread-safe, reference-counted pointer to a published [`Location`].
///
/// Sources publish every fix behind an [`Arc`] so that all observers share
/// the same immutable instance without copying it.
pub type LocationPtr = Arc<Location>;

/// Capacity of the per-event broadcast channels of a [`SourceCore`].
const EVENT_CHANNEL_CAPACITY: usize = 100;

struct CoreState {
    active_count: usize,
    location: Option<LocationPtr>,
    accuracy: AccuracyLevel,
}

struct CoreInner {
    name: &'static str,
    state: Mutex<CoreState>,
    location_tx: tokio::sync::broadcast::Sender<LocationPtr>,
    accuracy_tx: tokio::sync::broadcast::Sender<AccuracyLevel>,
    active_tx: tokio::sync::broadcast::Sender<bool>,
}

/// The embedded base every concrete location source composes.
///
/// The core owns the activation counter, the cached location and the
/// available accuracy level, and it distributes the three source event
/// kinds over dedicated [`tokio::sync::broadcast`] channels:
///
/// - location changed, emitted on every [`SourceCore::set_location`] call
/// - capability changed, emitted when the available accuracy actually differs
/// - active changed, emitted on every 0→1 and 1→0 activation edge
///
/// A `SourceCore` is cheaply cloneable; all clones share the same state.
/// [`SourceCore::set_location`] and [`SourceCore::set_available_accuracy`]
/// must only be called from the owning source's own update path, never by a
/// consumer of the source.
#[derive(Clone)]
pub struct SourceCore {
    inner: Arc<CoreInner>,
}

impl SourceCore {
    /// Creates a new inactive core without a cached location.
    ///
    /// `name` identifies the source in log output.
    pub fn new(name: &'static str) -> SourceCore {
        let (location_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (accuracy_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (active_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        SourceCore {
            inner: Arc::new(CoreInner {
                name,
                state: Mutex::new(CoreState {
                    active_count: 0,
                    location: None,
                    accuracy: AccuracyLevel::None,
                }),
                location_tx,
                accuracy_tx,
                active_tx,
            }),
        }
    }

    /// Returns the name of the source this core belongs to.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Adds one activation reference to the source.
    ///
    /// Returns `true` only when this call caused the 0→1 transition, in
    /// which case an active=true event is emitted. Every further call only
    /// adds a reference and returns `false`.
    pub fn start(&self) -> bool {
        let edge = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            state.active_count += 1;
            state.active_count == 1
        };
        if edge {
            debug!("Source {} became active", self.inner.name);
            let _ = self.inner.active_tx.send(true);
        }
        edge
    }

    /// Removes one activation reference from the source.
    ///
    /// Returns `true` only when this call caused the 1→0 transition, in
    /// which case an active=false event is emitted. Calling `stop` on an
    /// already inactive source is a no-op and returns `false`.
    pub fn stop(&self) -> bool {
        let edge = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if state.active_count == 0 {
                return false;
            }
            state.active_count -= 1;
            state.active_count == 0
        };
        if edge {
            debug!("Source {} became inactive", self.inner.name);
            let _ = self.inner.active_tx.send(false);
        }
        edge
    }

    /// Returns whether the activation counter is currently above zero.
    pub fn is_active(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_count
            > 0
    }

    /// Returns the current cached location without blocking.
    ///
    /// `None` as long as no fix has ever been obtained.
    pub fn location(&self) -> Option<LocationPtr> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .location
            .clone()
    }

    /// Replaces the cached location wholesale and notifies all observers.
    ///
    /// Only the owning source's own update path may call this.
    pub fn set_location(&self, location: Location) {
        let location = Arc::new(location);
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            state.location = Some(location.clone());
        }
        debug!(
            "Source {} published location lat: {} long: {} accuracy: {}m",
            self.inner.name,
            location.latitude(),
            location.longitude(),
            location.accuracy()
        );
        let _ = self.inner.location_tx.send(location);
    }

    /// Returns the best accuracy this source could report right now.
    pub fn available_accuracy(&self) -> AccuracyLevel {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .accuracy
    }

    /// Updates the available accuracy level of the source.
    ///
    /// A capability changed event is only emitted when the value actually
    /// differs from the previous one. Only the owning source's own update
    /// path may call this.
    pub fn set_available_accuracy(&self, accuracy: AccuracyLevel) {
        let changed = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let changed = state.accuracy != accuracy;
            state.accuracy = accuracy;
            changed
        };
        if changed {
            debug!(
                "Source {} available accuracy changed to {:?}",
                self.inner.name, accuracy
            );
            let _ = self.inner.accuracy_tx.send(accuracy);
        }
    }

    /// Subscribes to location changed events.
    pub fn subscribe_location(&self) -> tokio::sync::broadcast::Receiver<LocationPtr> {
        self.inner.location_tx.subscribe()
    }

    /// Subscribes to capability changed events.
    pub fn subscribe_accuracy(&self) -> tokio::sync::broadcast::Receiver<AccuracyLevel> {
        self.inner.accuracy_tx.subscribe()
    }

    /// Subscribes to active changed events.
    pub fn subscribe_active(&self) -> tokio::sync::broadcast::Receiver<bool> {
        self.inner.active_tx.subscribe()
    }
}

/// Common interface that every location source must support.
///
/// Concrete sources embed a [`SourceCore`] and only have to expose it; all
/// public operations are provided by delegation. Activation never fails: a
/// source that cannot acquire data simply never publishes a location and
/// keeps its available accuracy at [`AccuracyLevel::None`].
pub trait LocationSource {
    /// Returns the embedded core of the source.
    fn core(&self) -> &SourceCore;

    /// Adds one activation reference, see [`SourceCore::start`].
    fn start(&self) -> bool {
        self.core().start()
    }

    /// Removes one activation reference, see [`SourceCore::stop`].
    fn stop(&self) -> bool {
        self.core().stop()
    }

    /// Returns the current cached location, `None` if no fix was obtained yet.
    fn location(&self) -> Option<LocationPtr> {
        self.core().location()
    }

    /// Returns the best accuracy this source could report right now.
    fn available_accuracy(&self) -> AccuracyLevel {
        self.core().available_accuracy()
    }

    /// Subscribes to location changed events.
    fn subscribe_location(&self) -> tokio::sync::broadcast::Receiver<LocationPtr> {
        self.core().subscribe_location()
    }

    /// Subscribes to capability changed events.
    fn subscribe_accuracy(&self) -> tokio::sync::broadcast::Receiver<AccuracyLevel> {
        self.core().subscribe_accuracy()
    }

    /// Subscribes to active changed events.
    fn subscribe_active(&self) -> tokio::sync::broadcast::Receiver<bool> {
        self.core().subscribe_active()
    }
}
