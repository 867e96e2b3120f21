// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! GPS location source backed by a modem.
//!
//! Publishes raw GPS fixes that a modem relays, without any network round
//! trip of its own.

use chrono::Utc;
use common::location::Location;
use modem::{LocationCaps, ModemDelegate, ModemLocation, ModemManager, ModemSource};
use source_core::{LocationSource, SourceCore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Accuracy radius in meters attached to a raw GPS fix.
const GPS_RADIUS_M: f64 = 10.0;

/// Location source publishing the GPS fixes of a modem.
pub struct ModemGpsSource {
    core: SourceCore,
    supervisor: ModemSource<GpsFixDelegate>,
}

impl ModemGpsSource {
    pub fn new(manager: Arc<dyn ModemManager>, shutdown: CancellationToken) -> ModemGpsSource {
        let core = SourceCore::new("modem-gps");
        let delegate = GpsFixDelegate { core: core.clone() };
        ModemGpsSource {
            supervisor: ModemSource::new(core.clone(), manager, delegate, shutdown),
            core,
        }
    }

    /// Runs the source until the shutdown token is cancelled.
    pub async fn run(&mut self) {
        self.supervisor.run().await
    }
}

impl LocationSource for ModemGpsSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }
}

struct GpsFixDelegate {
    core: SourceCore,
}

#[async_trait::async_trait]
impl ModemDelegate for GpsFixDelegate {
    fn required_caps(&self) -> (LocationCaps, &'static str) {
        (LocationCaps::GPS_RAW | LocationCaps::GPS_NMEA, "GPS")
    }

    async fn modem_location_changed(&mut self, location: Arc<dyn ModemLocation>) {
        match location.gps_fix().await {
            Ok(fix) => {
                self.core.set_location(
                    Location::new(fix.latitude, fix.longitude, GPS_RADIUS_M)
                        .with_timestamp(&Utc::now()),
                );
            }
            Err(e) => debug!("No usable GPS fix. Error: {e}"),
        }
    }
}
