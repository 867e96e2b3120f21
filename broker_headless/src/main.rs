use cell3g::Cell3GSource;
use clap::{CommandFactory, Parser};
use common::cell::CellRegistration;
use dirs::config_dir;
use modem::sim::{SimModem, SimModemManager};
use modem::LocationCaps;
use modem_gps::ModemGpsSource;
use policy::Config;
use source_core::network::AlwaysAvailable;
use source_core::LocationSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run against a simulated modem that cycles through a few cells.
    #[arg(short, long)]
    sim: bool,
    /// Path of the policy configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Base URL of the cell tower lookup service.
    #[arg(long, default_value = "http://www.opencellid.org/cell/get")]
    lookup_url: String,
}

fn get_config_path(cli: &Cli) -> Result<PathBuf, ()> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    let mut path = config_dir().ok_or_else(|| {
        error!("Could not determine configuration directory");
    })?;
    path.push("locbroker");
    path.push("locbroker.toml");
    Ok(path)
}

fn load_policy(cli: &Cli) -> Result<Config, ()> {
    let path = get_config_path(cli)?;
    if !path.exists() {
        info!("No policy configuration at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(&path).map_err(|e| {
        error!("Failed to load policy configuration. Error: {e}");
    })
}

/// Cycles the simulated modem through a handful of serving cells so the
/// sources have something to report.
async fn drive_sim_modem(sim: Arc<SimModem>, shutdown: CancellationToken) {
    let cells = [
        CellRegistration::new(262, 2, 434, 23949),
        CellRegistration::new(262, 2, 434, 23950),
        CellRegistration::new(262, 1, 801, 86912),
    ];
    for registration in cells.iter().cycle() {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                sim.set_registration(*registration);
            }
        }
    }
}

/// Logs every location and accuracy update a source publishes.
async fn log_source_events(core: source_core::SourceCore, shutdown: CancellationToken) {
    let name = core.name().to_owned();
    let mut location_rx = core.subscribe_location();
    let mut accuracy_rx = core.subscribe_accuracy();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            location = location_rx.recv() => match location {
                Ok(location) => info!(
                    "Source {name} reported lat: {} lon: {} accuracy: {}m",
                    location.latitude(),
                    location.longitude(),
                    location.accuracy()
                ),
                Err(e) => {
                    warn!("Failed to receive location update. Error: {e}");
                    break;
                }
            },
            accuracy = accuracy_rx.recv() => match accuracy {
                Ok(accuracy) => info!("Source {name} accuracy level changed to {accuracy:?}"),
                Err(e) => {
                    warn!("Failed to receive accuracy update. Error: {e}");
                    break;
                }
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if !cli.sim {
        error!("No modem backend specified. Use --sim");
        Cli::command().print_help().unwrap();
        return Err(());
    }

    let policy = load_policy(&cli)?;
    info!(
        "Policy loaded, agent whitelisting {}",
        if policy.is_agent_allowed("org.freedesktop.GeoClue2.Agent") {
            "active"
        } else {
            "inactive"
        }
    );

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Shutting down");
        ctrlc_token.cancel();
    })
    .map_err(|e| {
        error!("Failed to install shutdown handler. Error: {e}");
    })?;

    let manager = Arc::new(SimModemManager::new());
    let sim = Arc::new(SimModem::new());
    manager.add_modem(sim.handle(
        "/sim/0",
        LocationCaps::CELL_3GPP | LocationCaps::GPS_RAW,
    ));

    let monitor = Arc::new(AlwaysAvailable);
    let mut cell3g = Cell3GSource::new(
        manager.clone(),
        monitor,
        &cli.lookup_url,
        shutdown.clone(),
    );
    let mut modem_gps = ModemGpsSource::new(manager, shutdown.clone());
    cell3g.start();
    modem_gps.start();

    info!("Starting sources...");
    let cell3g_logger = log_source_events(cell3g.core().clone(), shutdown.clone());
    let modem_gps_logger = log_source_events(modem_gps.core().clone(), shutdown.clone());
    let sim_driver = drive_sim_modem(sim, shutdown.clone());
    tokio::join!(
        cell3g.run(),
        modem_gps.run(),
        cell3g_logger,
        modem_gps_logger,
        sim_driver
    );
    Ok(())
}
