// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Cellular tower based location source.
//!
//! Resolves the serving 3GPP cell of a modem to a geographic position by
//! querying a cell tower database over HTTP.

use common::cell::CellRegistration;
use common::location::Location;
use modem::{LocationCaps, ModemDelegate, ModemLocation, ModemManager, ModemSource};
use source_core::network::NetworkMonitor;
use source_core::{LocationSource, SourceCore};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Accuracy radius in meters attached to every cell based fix,
/// approximating the coverage radius of a single cell.
const CELL_RADIUS_M: f64 = 3000.0;

/// Location source resolving the serving cell tower to a position.
///
/// Every raw location change of the configured modem yields the current
/// cell registration snapshot. A snapshot identical to the one a lookup was
/// already issued for is skipped; any other snapshot supersedes the
/// outstanding lookup, whether it is in flight or held back because the
/// network is offline.
pub struct Cell3GSource {
    core: SourceCore,
    supervisor: ModemSource<CellLookupDelegate>,
}

impl Cell3GSource {
    /// Creates the source.
    ///
    /// `lookup_url` is the base endpoint of the cell tower database; the
    /// four cell identifiers are appended as query parameters.
    pub fn new(
        manager: Arc<dyn ModemManager>,
        monitor: Arc<dyn NetworkMonitor>,
        lookup_url: &str,
        shutdown: CancellationToken,
    ) -> Cell3GSource {
        let core = SourceCore::new("cell3g");
        let delegate = CellLookupDelegate {
            core: core.clone(),
            client: reqwest::Client::new(),
            lookup_url: lookup_url.to_owned(),
            monitor,
            last_queried: None,
            query_token: None,
            publish_lock: Arc::new(Mutex::new(())),
            shutdown: shutdown.clone(),
        };
        Cell3GSource {
            supervisor: ModemSource::new(core.clone(), manager, delegate, shutdown),
            core,
        }
    }

    /// Runs the source until the shutdown token is cancelled.
    pub async fn run(&mut self) {
        self.supervisor.run().await
    }
}

impl LocationSource for Cell3GSource {
    fn core(&self) -> &SourceCore {
        &self.core
    }
}

struct CellLookupDelegate {
    core: SourceCore,
    client: reqwest::Client,
    lookup_url: String,
    monitor: Arc<dyn NetworkMonitor>,
    /// Snapshot the most recent lookup was issued for. Kept across failed
    /// lookups so an unchanged cell never causes a second query.
    last_queried: Option<CellRegistration>,
    query_token: Option<CancellationToken>,
    /// Held around both the cancellation of a superseded lookup and the
    /// final cancelled-check-and-publish of every lookup task. A lookup
    /// that observes its token uncancelled under this lock publishes
    /// before its successor can be issued.
    publish_lock: Arc<Mutex<()>>,
    shutdown: CancellationToken,
}

#[async_trait::async_trait]
impl ModemDelegate for CellLookupDelegate {
    fn required_caps(&self) -> (LocationCaps, &'static str) {
        (LocationCaps::CELL_3GPP, "3GPP")
    }

    async fn modem_location_changed(&mut self, location: Arc<dyn ModemLocation>) {
        let registration = match location.cell_registration().await {
            Ok(registration) => registration,
            Err(e) => {
                debug!("No usable cell registration. Error: {e}");
                return;
            }
        };
        if self.last_queried == Some(registration) {
            debug!("Serving cell unchanged, skipping lookup");
            return;
        }
        // A newer snapshot supersedes the outstanding lookup so that a
        // stale response can never overwrite a fresher one.
        if let Some(token) = self.query_token.take() {
            let _publish = self.publish_lock.lock().unwrap_or_else(|e| e.into_inner());
            token.cancel();
        }
        self.last_queried = Some(registration);
        let token = self.shutdown.child_token();
        self.query_token = Some(token.clone());
        let url = lookup_url(&self.lookup_url, &registration);
        let client = self.client.clone();
        let monitor = self.monitor.clone();
        let core = self.core.clone();
        let publish_lock = self.publish_lock.clone();
        debug!(
            "Looking up cell mcc: {} mnc: {} lac: {} cid: {}",
            registration.mcc, registration.mnc, registration.lac, registration.cid
        );
        tokio::spawn(
            async move { run_lookup(client, monitor, core, url, token, publish_lock).await },
        );
    }

    fn deactivated(&mut self) {
        if let Some(token) = self.query_token.take() {
            let _publish = self.publish_lock.lock().unwrap_or_else(|e| e.into_inner());
            token.cancel();
        }
    }
}

fn lookup_url(base: &str, registration: &CellRegistration) -> String {
    format!(
        "{base}?mcc={}&mnc={}&lac={}&cellid={}",
        registration.mcc, registration.mnc, registration.lac, registration.cid
    )
}

async fn run_lookup(
    client: reqwest::Client,
    monitor: Arc<dyn NetworkMonitor>,
    core: SourceCore,
    url: String,
    token: CancellationToken,
    publish_lock: Arc<Mutex<()>>,
) {
    if !monitor.is_available() {
        debug!("Network unavailable, holding cell lookup");
        tokio::select! {
            _ = token.cancelled() => return,
            _ = monitor.wait_available() => {}
        }
    }
    let response = tokio::select! {
        _ = token.cancelled() => return,
        response = client.get(url.as_str()).send() => response,
    };
    let response = match response.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
            warn!("Cell lookup request failed. Error: {e}");
            return;
        }
    };
    let body = tokio::select! {
        _ = token.cancelled() => return,
        body = response.text() => match body {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read cell lookup response. Error: {e}");
                return;
            }
        },
    };
    // The cancel path holds the same lock, so a supersede can not slip in
    // between this check and the publish.
    let _publish = publish_lock.lock().unwrap_or_else(|e| e.into_inner());
    if token.is_cancelled() {
        return;
    }
    match parse_lookup_response(&body) {
        Some((latitude, longitude)) => {
            core.set_location(Location::new(latitude, longitude, CELL_RADIUS_M));
        }
        None => warn!("Cell lookup response contained no usable cell element"),
    }
}

/// Extracts latitude and longitude from the first `cell` element of a
/// lookup response like `<rsp><cell lat="60.17" lon="24.93"/></rsp>`.
fn parse_lookup_response(body: &str) -> Option<(f64, f64)> {
    let document = match roxmltree::Document::parse(body) {
        Ok(document) => document,
        Err(e) => {
            warn!("Failed to parse cell lookup response. Error: {e}");
            return None;
        }
    };
    let cell = document
        .descendants()
        .find(|node| node.has_tag_name("cell"))?;
    let latitude = cell.attribute("lat")?.parse().ok()?;
    let longitude = cell.attribute("lon")?.parse().ok()?;
    Some((latitude, longitude))
}

#[cfg(test)]
mod tests;
