// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::accuracy::AccuracyLevel;
use common::cell::CellRegistration;
use modem::sim::{SimModem, SimModemManager};
use modem::{LocationCaps, ModemDelegate, ModemError, ModemLocation, ModemSource};
use source_core::test_helper::{expect_no_event, next_event};
use source_core::SourceCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const TIMEOUT_MS: u64 = 500;

/// Delegate that forwards every callback to the test through a channel.
struct RecordingDelegate {
    required: LocationCaps,
    callbacks_tx: mpsc::UnboundedSender<Option<CellRegistration>>,
}

#[async_trait::async_trait]
impl ModemDelegate for RecordingDelegate {
    fn required_caps(&self) -> (LocationCaps, &'static str) {
        (self.required, "test")
    }

    async fn modem_location_changed(&mut self, location: Arc<dyn ModemLocation>) {
        let _ = self.callbacks_tx.send(location.cell_registration().await.ok());
    }
}

struct TestSetup {
    core: SourceCore,
    manager: Arc<SimModemManager>,
    shutdown: CancellationToken,
    callbacks_rx: mpsc::UnboundedReceiver<Option<CellRegistration>>,
}

fn spawn_supervisor(required: LocationCaps) -> TestSetup {
    let core = SourceCore::new("test");
    let manager = Arc::new(SimModemManager::new());
    let shutdown = CancellationToken::new();
    let (callbacks_tx, callbacks_rx) = mpsc::unbounded_channel();
    let delegate = RecordingDelegate {
        required,
        callbacks_tx,
    };
    let mut supervisor = ModemSource::new(
        core.clone(),
        manager.clone(),
        delegate,
        shutdown.clone(),
    );
    tokio::spawn(async move { supervisor.run().await });
    TestSetup {
        core,
        manager,
        shutdown,
        callbacks_rx,
    }
}

async fn next_callback(
    rx: &mut mpsc::UnboundedReceiver<Option<CellRegistration>>,
) -> Option<CellRegistration> {
    timeout(Duration::from_millis(TIMEOUT_MS), rx.recv())
        .await
        .expect("Failed to receive delegate callback in required time")
        .expect("Delegate callback channel closed")
}

async fn wait_until(condition: impl Fn() -> bool) {
    let steps = TIMEOUT_MS / 10;
    for _ in 0..steps {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Condition not met within {TIMEOUT_MS}ms");
}

#[test_log::test(tokio::test)]
async fn adopting_a_capable_modem_raises_the_available_accuracy() {
    let setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let mut accuracy_rx = setup.core.subscribe_accuracy();

    let sim = Arc::new(SimModem::new());
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));

    assert_eq!(
        next_event(&mut accuracy_rx, Duration::from_millis(TIMEOUT_MS)).await,
        AccuracyLevel::Locality
    );
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn gps_requirements_report_exact_accuracy() {
    let setup = spawn_supervisor(LocationCaps::GPS_RAW | LocationCaps::GPS_NMEA);
    let mut accuracy_rx = setup.core.subscribe_accuracy();

    let sim = Arc::new(SimModem::new());
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::GPS_RAW));

    assert_eq!(
        next_event(&mut accuracy_rx, Duration::from_millis(TIMEOUT_MS)).await,
        AccuracyLevel::Exact
    );
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn modem_with_mismatched_capabilities_is_ignored() {
    let setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let mut accuracy_rx = setup.core.subscribe_accuracy();

    let sim = Arc::new(SimModem::new());
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::GPS_RAW));
    setup.core.start();

    expect_no_event(&mut accuracy_rx, Duration::from_millis(200)).await;
    assert_eq!(setup.core.available_accuracy(), AccuracyLevel::None);
    assert_eq!(sim.enable_calls(), 0);
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn starting_enables_and_configures_the_modem() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let sim = Arc::new(SimModem::new());
    setup
        .manager
        .add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP | LocationCaps::GPS_RAW));

    setup.core.start();

    // Initial delivery right after the capability setup succeeded.
    assert_eq!(next_callback(&mut setup.callbacks_rx).await, None);
    assert_eq!(sim.enable_calls(), 1);
    // Only the intersection with the modem capabilities is requested.
    assert_eq!(sim.setup_calls(), vec![LocationCaps::CELL_3GPP]);
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn second_start_does_not_duplicate_the_enable_handshake() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let sim = Arc::new(SimModem::new());
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));

    setup.core.start();
    setup.core.start();

    next_callback(&mut setup.callbacks_rx).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sim.enable_calls(), 1);
    assert_eq!(sim.setup_calls(), vec![LocationCaps::CELL_3GPP]);
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn raw_location_changes_are_forwarded_to_the_delegate() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let sim = Arc::new(SimModem::new());
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));
    setup.core.start();
    next_callback(&mut setup.callbacks_rx).await;

    let registration = CellRegistration::new(262, 2, 5126, 163441);
    sim.set_registration(registration);

    assert_eq!(
        next_callback(&mut setup.callbacks_rx).await,
        Some(registration)
    );
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn concurrent_enable_by_a_sibling_caller_is_a_soft_success() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let sim = Arc::new(SimModem::new());
    sim.fail_enable_with(ModemError::AlreadyEnabling);
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));

    setup.core.start();

    // Configuration proceeds despite the enable "failure".
    assert_eq!(next_callback(&mut setup.callbacks_rx).await, None);
    assert_eq!(sim.setup_calls(), vec![LocationCaps::CELL_3GPP]);
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn enable_failure_is_logged_and_not_fatal() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let sim = Arc::new(SimModem::new());
    sim.fail_enable_with(ModemError::Device("firmware rebooting".to_owned()));
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));

    setup.core.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(setup.callbacks_rx.try_recv().is_err());
    assert!(sim.setup_calls().is_empty());
    // The modem is still present, so the availability is unchanged.
    assert_eq!(setup.core.available_accuracy(), AccuracyLevel::Locality);
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn stopping_clears_the_requested_capabilities() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let sim = Arc::new(SimModem::new());
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));
    setup.core.start();
    next_callback(&mut setup.callbacks_rx).await;

    setup.core.stop();

    let sim_for_wait = sim.clone();
    wait_until(move || sim_for_wait.setup_calls().last() == Some(&LocationCaps::NONE)).await;
    assert_eq!(
        sim.setup_calls(),
        vec![LocationCaps::CELL_3GPP, LocationCaps::NONE]
    );
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn vanished_modem_tears_down_regardless_of_references() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let sim = Arc::new(SimModem::new());
    setup.manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));
    setup.core.start();
    next_callback(&mut setup.callbacks_rx).await;
    let mut accuracy_rx = setup.core.subscribe_accuracy();

    setup.manager.remove_modem("/sim/0");

    assert_eq!(
        next_event(&mut accuracy_rx, Duration::from_millis(TIMEOUT_MS)).await,
        AccuracyLevel::None
    );
    // Raw location changes of the vanished modem are no longer forwarded.
    sim.set_registration(CellRegistration::new(262, 2, 5126, 163441));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(setup.callbacks_rx.try_recv().is_err());
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn next_capable_modem_is_adopted_while_still_referenced() {
    let mut setup = spawn_supervisor(LocationCaps::CELL_3GPP);
    let first = Arc::new(SimModem::new());
    setup.manager.add_modem(first.handle("/sim/0", LocationCaps::CELL_3GPP));
    setup.core.start();
    next_callback(&mut setup.callbacks_rx).await;

    setup.manager.remove_modem("/sim/0");
    let second = Arc::new(SimModem::new());
    setup.manager.add_modem(second.handle("/sim/1", LocationCaps::CELL_3GPP));

    // Still referenced, so the replacement is enabled right away.
    assert_eq!(next_callback(&mut setup.callbacks_rx).await, None);
    assert_eq!(second.enable_calls(), 1);
    assert_eq!(setup.core.available_accuracy(), AccuracyLevel::Locality);
    setup.shutdown.cancel();
}

#[test_log::test(tokio::test)]
async fn modem_present_at_startup_is_adopted() {
    let core = SourceCore::new("test");
    let manager = Arc::new(SimModemManager::new());
    let sim = Arc::new(SimModem::new());
    manager.add_modem(sim.handle("/sim/0", LocationCaps::CELL_3GPP));
    let shutdown = CancellationToken::new();
    let (callbacks_tx, mut callbacks_rx) = mpsc::unbounded_channel();
    let delegate = RecordingDelegate {
        required: LocationCaps::CELL_3GPP,
        callbacks_tx,
    };
    core.start();
    let mut supervisor = ModemSource::new(core.clone(), manager.clone(), delegate, shutdown.clone());
    tokio::spawn(async move { supervisor.run().await });

    assert_eq!(next_callback(&mut callbacks_rx).await, None);
    assert_eq!(core.available_accuracy(), AccuracyLevel::Locality);
    shutdown.cancel();
}
