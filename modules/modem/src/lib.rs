// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Modem Modul for the location broker
//!
//! Provides the interfaces to a system modem management service and the
//! supervisor that bridges a live modem to the location source contract.

use common::cell::CellRegistration;
use std::fmt;
use std::sync::Arc;

pub mod sim;
pub mod supervisor;

pub use supervisor::{ModemDelegate, ModemSource};

/// Set of location acquisition techniques a modem supports.
///
/// Concrete sources declare the bits that make a modem interesting to them,
/// see [`ModemDelegate::required_caps`].
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct LocationCaps(u32);

impl LocationCaps {
    /// No location capabilities at all.
    pub const NONE: LocationCaps = LocationCaps(0);
    /// 3GPP cell registration based location (MCC/MNC/LAC/CID).
    pub const CELL_3GPP: LocationCaps = LocationCaps(1 << 0);
    /// Raw GPS fixes relayed through the modem.
    pub const GPS_RAW: LocationCaps = LocationCaps(1 << 1);
    /// NMEA sentence based GPS relayed through the modem.
    pub const GPS_NMEA: LocationCaps = LocationCaps(1 << 2);

    /// Returns whether any bit is shared with `other`.
    pub fn intersects(self, other: LocationCaps) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the bits shared with `other`.
    pub fn intersection(self, other: LocationCaps) -> LocationCaps {
        LocationCaps(self.0 & other.0)
    }

    /// Returns whether no bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for LocationCaps {
    type Output = LocationCaps;

    fn bitor(self, rhs: LocationCaps) -> LocationCaps {
        LocationCaps(self.0 | rhs.0)
    }
}

impl fmt::Debug for LocationCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut names = Vec::new();
        if self.intersects(LocationCaps::CELL_3GPP) {
            names.push("CELL_3GPP");
        }
        if self.intersects(LocationCaps::GPS_RAW) {
            names.push("GPS_RAW");
        }
        if self.intersects(LocationCaps::GPS_NMEA) {
            names.push("GPS_NMEA");
        }
        write!(f, "{}", names.join(" | "))
    }
}

/// Errors reported by the modem management service.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModemError {
    /// Another caller is concurrently enabling the same modem. The
    /// supervisor treats this outcome as a soft success.
    #[error("the modem is already being enabled by another caller")]
    AlreadyEnabling,
    /// The modem is not registered with a cell tower yet.
    #[error("the modem has no cell registration yet")]
    NoRegistration,
    /// The modem GPS has not acquired a fix yet.
    #[error("the modem has no GPS fix yet")]
    NoFix,
    /// Talking to the modem failed.
    #[error("modem communication failed: {0}")]
    Device(String),
}

/// A raw GPS fix relayed through a modem.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpsFix {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Altitude above sea level in meters, when the modem reports one.
    pub altitude: Option<f64>,
}

/// Control surface of a single modem.
#[async_trait::async_trait]
pub trait ModemControl: Send + Sync {
    /// Powers the modem up so that it can report location data.
    async fn enable(&self) -> Result<(), ModemError>;
}

/// Location surface of a single modem.
#[async_trait::async_trait]
pub trait ModemLocation: Send + Sync {
    /// Requests the given capability set from the modem.
    ///
    /// Requesting [`LocationCaps::NONE`] clears a previous request.
    async fn setup(&self, caps: LocationCaps) -> Result<(), ModemError>;

    /// Reads the current 3GPP cell registration snapshot.
    async fn cell_registration(&self) -> Result<CellRegistration, ModemError>;

    /// Reads the current raw GPS fix.
    async fn gps_fix(&self) -> Result<GpsFix, ModemError>;

    /// Subscribes to the raw location changed notifications of the modem.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()>;
}

/// A single modem object exposed by the modem management service.
///
/// The handle is exclusively tracked by one [`ModemSource`] supervisor for
/// as long as the modem is present on the system; delegates only receive
/// shared references for issuing commands.
#[derive(Clone)]
pub struct ModemHandle {
    path: String,
    caps: LocationCaps,
    control: Arc<dyn ModemControl>,
    location: Arc<dyn ModemLocation>,
}

impl ModemHandle {
    pub fn new(
        path: &str,
        caps: LocationCaps,
        control: Arc<dyn ModemControl>,
        location: Arc<dyn ModemLocation>,
    ) -> ModemHandle {
        ModemHandle {
            path: path.to_owned(),
            caps,
            control,
            location,
        }
    }

    /// Returns the stable path identifying the modem on the system.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the capability bitmask of the modem.
    pub fn caps(&self) -> LocationCaps {
        self.caps
    }

    /// Returns the control surface of the modem.
    pub fn control(&self) -> Arc<dyn ModemControl> {
        self.control.clone()
    }

    /// Returns the location surface of the modem.
    pub fn location(&self) -> Arc<dyn ModemLocation> {
        self.location.clone()
    }
}

impl fmt::Debug for ModemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModemHandle")
            .field("path", &self.path)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

/// Notification emitted by the modem management service.
#[derive(Clone, Debug)]
pub enum ModemEvent {
    /// A modem appeared on the system.
    Appeared(ModemHandle),
    /// The modem with the given path vanished from the system.
    Vanished(String),
}

/// The system modem management service.
///
/// Exposes the currently present modems and notifies about modems
/// appearing and vanishing at runtime.
#[async_trait::async_trait]
pub trait ModemManager: Send + Sync {
    /// Returns the modems currently present on the system.
    async fn modems(&self) -> Vec<ModemHandle>;

    /// Subscribes to modem appeared/vanished notifications.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ModemEvent>;
}
