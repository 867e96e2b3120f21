//! Simulated modem backend.
//!
//! Provides a fully scriptable in-process stand-in for the system modem
//! management service. It backs the headless binary when no real modem
//! integration is available and doubles as the test double for the
//! supervisor and the concrete sources.

use crate::{
    GpsFix, LocationCaps, ModemControl, ModemError, ModemEvent, ModemHandle, ModemLocation,
    ModemManager,
};
use common::cell::CellRegistration;
use std::sync::{Arc, Mutex};

/// Capacity of the notification channels of the simulated backend.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// A [`ModemManager`] whose modem population is driven by the caller.
pub struct SimModemManager {
    modems: Mutex<Vec<ModemHandle>>,
    events_tx: tokio::sync::broadcast::Sender<ModemEvent>,
}

impl SimModemManager {
    pub fn new() -> SimModemManager {
        let (events_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        SimModemManager {
            modems: Mutex::new(Vec::new()),
            events_tx,
        }
    }

    /// Makes a modem appear on the simulated system.
    pub fn add_modem(&self, handle: ModemHandle) {
        self.modems
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle.clone());
        let _ = self.events_tx.send(ModemEvent::Appeared(handle));
    }

    /// Makes the modem with the given path vanish from the simulated system.
    pub fn remove_modem(&self, path: &str) {
        self.modems
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|modem| modem.path() != path);
        let _ = self.events_tx.send(ModemEvent::Vanished(path.to_owned()));
    }
}

impl Default for SimModemManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ModemManager for SimModemManager {
    async fn modems(&self) -> Vec<ModemHandle> {
        self.modems
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ModemEvent> {
        self.events_tx.subscribe()
    }
}

struct SimModemState {
    registration: Option<CellRegistration>,
    gps_fix: Option<GpsFix>,
    enable_error: Option<ModemError>,
    enable_calls: usize,
    setup_calls: Vec<LocationCaps>,
}

/// A scriptable modem implementing both modem surfaces.
///
/// Registration and GPS data are set by the caller; every change emits a
/// raw location changed notification, just like a real modem does on every
/// minor event.
pub struct SimModem {
    state: Mutex<SimModemState>,
    raw_tx: tokio::sync::broadcast::Sender<()>,
}

impl SimModem {
    pub fn new() -> SimModem {
        let (raw_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        SimModem {
            state: Mutex::new(SimModemState {
                registration: None,
                gps_fix: None,
                enable_error: None,
                enable_calls: 0,
                setup_calls: Vec::new(),
            }),
            raw_tx,
        }
    }

    /// Builds a [`ModemHandle`] exposing this modem under the given path
    /// with the given capability bitmask.
    pub fn handle(self: &Arc<Self>, path: &str, caps: LocationCaps) -> ModemHandle {
        ModemHandle::new(path, caps, self.clone(), self.clone())
    }

    /// Sets the serving cell and emits a raw location changed notification.
    pub fn set_registration(&self, registration: CellRegistration) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .registration = Some(registration);
        let _ = self.raw_tx.send(());
    }

    /// Sets the GPS fix and emits a raw location changed notification.
    pub fn set_gps_fix(&self, fix: GpsFix) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).gps_fix = Some(fix);
        let _ = self.raw_tx.send(());
    }

    /// Emits a raw location changed notification without changing any data.
    pub fn notify_location_changed(&self) {
        let _ = self.raw_tx.send(());
    }

    /// Makes every following enable call fail with the given error.
    pub fn fail_enable_with(&self, error: ModemError) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .enable_error = Some(error);
    }

    /// Returns how often the modem was asked to enable itself.
    pub fn enable_calls(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .enable_calls
    }

    /// Returns the capability sets requested so far, in call order.
    pub fn setup_calls(&self) -> Vec<LocationCaps> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .setup_calls
            .clone()
    }
}

impl Default for SimModem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ModemControl for SimModem {
    async fn enable(&self) -> Result<(), ModemError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.enable_calls += 1;
        match &state.enable_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ModemLocation for SimModem {
    async fn setup(&self, caps: LocationCaps) -> Result<(), ModemError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .setup_calls
            .push(caps);
        Ok(())
    }

    async fn cell_registration(&self) -> Result<CellRegistration, ModemError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .registration
            .ok_or(ModemError::NoRegistration)
    }

    async fn gps_fix(&self) -> Result<GpsFix, ModemError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gps_fix
            .ok_or(ModemError::NoFix)
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.raw_tx.subscribe()
    }
}
