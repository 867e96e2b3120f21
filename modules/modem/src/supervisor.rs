use crate::{LocationCaps, ModemError, ModemEvent, ModemHandle, ModemLocation, ModemManager};
use common::accuracy::AccuracyLevel;
use source_core::SourceCore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Contract a concrete modem backed source fills in.
///
/// The supervisor calls the delegate from its own run loop, so delegate
/// implementations never race with supervisor state changes.
#[async_trait::async_trait]
pub trait ModemDelegate: Send {
    /// Declares which capability bits make a modem interesting to this
    /// source, together with a short name used in log output.
    fn required_caps(&self) -> (LocationCaps, &'static str);

    /// Invoked every time the configured modem reports new raw location
    /// data, and once right after the capability setup succeeded.
    async fn modem_location_changed(&mut self, location: Arc<dyn ModemLocation>);

    /// Invoked when the source stops being active or loses its modem.
    ///
    /// Delegates cancel their own outstanding work here.
    fn deactivated(&mut self) {}
}

enum SupervisorEvent {
    Configured,
    EnableFailed(ModemError),
    RawLocationChanged,
}

/// Bridges the location source contract to a live system modem.
///
/// The modem may not exist yet, may appear and vanish at runtime and has to
/// be enabled and configured with the required capability set before it
/// reports anything. The supervisor tracks at most one modem at a time,
/// first come first served, and only issues hardware calls while the
/// activation counter of the source is above zero.
pub struct ModemSource<D: ModemDelegate> {
    core: SourceCore,
    manager: Arc<dyn ModemManager>,
    delegate: D,
    shutdown: CancellationToken,
    modem: Option<ModemHandle>,
    configured: bool,
    enable_token: Option<CancellationToken>,
    subscription_token: Option<CancellationToken>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
}

impl<D: ModemDelegate> ModemSource<D> {
    pub fn new(
        core: SourceCore,
        manager: Arc<dyn ModemManager>,
        delegate: D,
        shutdown: CancellationToken,
    ) -> ModemSource<D> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        ModemSource {
            core,
            manager,
            delegate,
            shutdown,
            modem: None,
            configured: false,
            enable_token: None,
            subscription_token: None,
            events_tx,
            events_rx,
        }
    }

    /// Returns the embedded core of the supervised source.
    pub fn core(&self) -> &SourceCore {
        &self.core
    }

    /// Runs the supervisor until the shutdown token is cancelled.
    pub async fn run(&mut self) {
        let mut manager_rx = self.manager.subscribe();
        let mut active_rx = self.core.subscribe_active();
        for handle in self.manager.modems().await {
            self.modem_appeared(handle);
        }
        if self.core.is_active() {
            self.begin_enable();
        }
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                active = active_rx.recv() => match active {
                    Ok(true) => self.begin_enable(),
                    Ok(false) => self.deactivate(),
                    Err(e) => debug!("Failed to receive activation event. Error: {e}"),
                },
                event = manager_rx.recv() => match event {
                    Ok(ModemEvent::Appeared(handle)) => self.modem_appeared(handle),
                    Ok(ModemEvent::Vanished(path)) => self.modem_vanished(&path),
                    Err(e) => debug!("Failed to receive modem manager event. Error: {e}"),
                },
                Some(event) = self.events_rx.recv() => match event {
                    SupervisorEvent::Configured => self.on_configured().await,
                    SupervisorEvent::EnableFailed(e) => {
                        self.enable_token = None;
                        error!(
                            "Failed to enable modem for source {}. Error: {e}",
                            self.core.name()
                        );
                    }
                    SupervisorEvent::RawLocationChanged => self.forward_location_changed().await,
                },
            }
        }
        self.cancel_operations();
    }

    fn modem_appeared(&mut self, handle: ModemHandle) {
        if self.modem.is_some() {
            return;
        }
        let (required, name) = self.delegate.required_caps();
        if !handle.caps().intersects(required) {
            debug!(
                "Ignoring modem {} without {} capabilities (caps: {:?})",
                handle.path(),
                name,
                handle.caps()
            );
            return;
        }
        info!("Source {} adopted modem {}", self.core.name(), handle.path());
        self.modem = Some(handle);
        self.core.set_available_accuracy(accuracy_for(required));
        if self.core.is_active() {
            self.begin_enable();
        }
    }

    fn modem_vanished(&mut self, path: &str) {
        let Some(modem) = &self.modem else {
            return;
        };
        if modem.path() != path {
            return;
        }
        info!("Source {} lost modem {}", self.core.name(), path);
        self.cancel_operations();
        self.configured = false;
        self.modem = None;
        self.delegate.deactivated();
        self.core.set_available_accuracy(AccuracyLevel::None);
    }

    /// Kicks off the enable and capability setup handshake.
    ///
    /// The handshake runs as a cancellable task that reports back through
    /// the internal event channel, leaving the run loop free to process a
    /// competing `stop` or a vanishing modem while it is in flight.
    fn begin_enable(&mut self) {
        let Some(modem) = &self.modem else {
            debug!(
                "Source {} activated without a modem present",
                self.core.name()
            );
            return;
        };
        if self.configured || self.enable_token.is_some() {
            return;
        }
        let (required, _) = self.delegate.required_caps();
        let request = modem.caps().intersection(required);
        let control = modem.control();
        let location = modem.location();
        let token = self.shutdown.child_token();
        self.enable_token = Some(token.clone());
        let events_tx = self.events_tx.clone();
        debug!(
            "Source {} enabling modem {} with requested caps {:?}",
            self.core.name(),
            modem.path(),
            request
        );
        tokio::spawn(async move {
            let handshake = async {
                match control.enable().await {
                    // A sibling activation racing us on the same modem is a
                    // soft success, the modem ends up enabled either way.
                    Ok(()) | Err(ModemError::AlreadyEnabling) => {}
                    Err(e) => return Err(e),
                }
                location.setup(request).await
            };
            tokio::select! {
                _ = token.cancelled() => {}
                result = handshake => {
                    let event = match result {
                        Ok(()) => SupervisorEvent::Configured,
                        Err(e) => SupervisorEvent::EnableFailed(e),
                    };
                    let _ = events_tx.send(event);
                }
            }
        });
    }

    async fn on_configured(&mut self) {
        self.enable_token = None;
        let Some(modem) = &self.modem else {
            return;
        };
        if !self.core.is_active() {
            // Stopped while the handshake was still in flight.
            self.clear_requested_caps();
            return;
        }
        info!(
            "Source {} configured modem {}",
            self.core.name(),
            modem.path()
        );
        self.configured = true;
        let mut raw_rx = modem.location().subscribe();
        let token = self.shutdown.child_token();
        self.subscription_token = Some(token.clone());
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = raw_rx.recv() => match changed {
                        Ok(()) => {
                            let _ = events_tx.send(SupervisorEvent::RawLocationChanged);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    },
                }
            }
        });
        // The modem may already know a location, deliver it once right away.
        let location = modem.location();
        self.delegate.modem_location_changed(location).await;
    }

    async fn forward_location_changed(&mut self) {
        let Some(modem) = &self.modem else {
            return;
        };
        if !self.configured {
            return;
        }
        let location = modem.location();
        self.delegate.modem_location_changed(location).await;
    }

    fn deactivate(&mut self) {
        self.cancel_operations();
        self.delegate.deactivated();
        if self.configured {
            self.configured = false;
            self.clear_requested_caps();
        }
    }

    fn cancel_operations(&mut self) {
        if let Some(token) = self.enable_token.take() {
            token.cancel();
        }
        if let Some(token) = self.subscription_token.take() {
            token.cancel();
        }
    }

    /// Clears the previously requested capability set, best effort.
    fn clear_requested_caps(&self) {
        let Some(modem) = &self.modem else {
            return;
        };
        let location = modem.location();
        let path = modem.path().to_owned();
        tokio::spawn(async move {
            if let Err(e) = location.setup(LocationCaps::NONE).await {
                warn!("Failed to clear requested capabilities on modem {path}. Error: {e}");
            }
        });
    }
}

fn accuracy_for(required: LocationCaps) -> AccuracyLevel {
    if required.intersects(LocationCaps::GPS_RAW | LocationCaps::GPS_NMEA) {
        AccuracyLevel::Exact
    } else if required.intersects(LocationCaps::CELL_3GPP) {
        AccuracyLevel::Locality
    } else {
        AccuracyLevel::None
    }
}
