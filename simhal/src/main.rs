//! # SimHAL Binary
//!
//! Runs a step-synchronized session against the built-in simulated world:
//! one stepper plus a number of follower threads that observe every tick in
//! lockstep, the way sensor and motor polling threads do in a robot program.
//!
//! # Usage
//!
//! ```bash
//! # Stepper plus two followers, 100 ticks
//! simhal --followers 2 --ticks 100
//!
//! # Background stepper with a 250 ms period, stop after 40 simulated ticks
//! simhal --background 250 --max-ticks 40
//!
//! # Config file, verbose JSON logs
//! simhal --config config/simhal.toml -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use simhal::{DriverRegistry, StepCoordinator};
use simhal_common::config::{ConfigLoader, SimHalConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// SimHAL - step-synchronized simulator session
#[derive(Parser, Debug)]
#[command(name = "simhal")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Step-synchronized hardware abstraction shim for simulated robots")]
#[command(long_about = None)]
struct Args {
    /// Path to configuration file (simhal.toml). Defaults are used if omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tick driver to load from the registry
    #[arg(short, long)]
    driver: Option<String>,

    /// Number of follower threads (parties = followers + 1)
    #[arg(short, long)]
    followers: Option<usize>,

    /// Stop after driving this many ticks in the foreground
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Tick period used by sleep and the background stepper, in milliseconds
    #[arg(long, value_name = "MS")]
    tick_period_ms: Option<u64>,

    /// Drive ticks from a background stepper with this period, in milliseconds
    #[arg(short, long, value_name = "MS")]
    background: Option<u64>,

    /// End the simulated session after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Pace simulated ticks to wall-clock time
    #[arg(long)]
    realtime: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // The log level comes from the config, so no subscriber exists yet.
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("simhal: {e}");
            std::process::exit(2);
        }
    };
    setup_tracing(&args, &config);

    if let Err(e) = run(&args, &config) {
        error!("SimHAL failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &SimHalConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "SimHAL v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let registry = DriverRegistry::with_builtin();
    debug!("Available drivers: {:?}", registry.list_drivers());
    let driver = registry.create_driver(&config.session.driver, &config.simulation)?;
    let coordinator = Arc::new(StepCoordinator::with_config(driver, &config.session)?);

    // Setup signal handler: ending the session releases every party.
    let on_signal = Arc::clone(&coordinator);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        if let Err(e) = on_signal.shutdown() {
            warn!("Shutdown after signal failed: {}", e);
        }
    })?;

    let followers: Vec<JoinHandle<u64>> = (1..config.session.parties)
        .map(|id| spawn_follower(id, Arc::clone(&coordinator)))
        .collect::<Result<_, _>>()?;
    info!(
        "Session running with {} parties ({} followers)",
        config.session.parties,
        followers.len()
    );

    let driven = if let Some(period_ms) = config.session.background_period_ms {
        coordinator.run_in_background(Some(period_ms))?.join()?
    } else {
        drive_foreground(&coordinator, args.ticks)
    };

    // Followers are still blocked if the tick budget ran out first.
    coordinator.shutdown()?;

    for (idx, handle) in followers.into_iter().enumerate() {
        match handle.join() {
            Ok(rounds) => info!("Follower {} observed {} ticks", idx + 1, rounds),
            Err(_) => warn!("Follower {} panicked", idx + 1),
        }
    }

    info!(
        "SimHAL shutdown complete: {} ticks driven, {:?} simulated",
        driven,
        coordinator.tick_duration().saturating_mul(u32::try_from(driven).unwrap_or(u32::MAX))
    );
    Ok(())
}

/// Load the config file (or defaults) and apply CLI overrides.
fn load_config(args: &Args) -> Result<SimHalConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => SimHalConfig::load(path)
            .map_err(|e| format!("{}: {e}", path.display()))?,
        None => SimHalConfig::default(),
    };

    if let Some(driver) = &args.driver {
        config.session.driver.clone_from(driver);
    }
    if let Some(followers) = args.followers {
        config.session.parties = followers + 1;
    }
    if let Some(period) = args.tick_period_ms {
        config.session.tick_period_ms = period;
    }
    if args.background.is_some() {
        config.session.background_period_ms = args.background;
    }
    if args.max_ticks.is_some() {
        config.simulation.max_ticks = args.max_ticks;
    }
    if args.realtime {
        config.simulation.realtime = true;
    }

    config.validate()?;
    Ok(config)
}

/// Drive ticks from the main thread until the budget is spent or the session ends.
fn drive_foreground(coordinator: &StepCoordinator, ticks: Option<u64>) -> u64 {
    let start = coordinator.ticks();
    match ticks {
        Some(count) => {
            if !coordinator.drive_ticks(count) {
                info!("Session ended before {} ticks", count);
            }
        }
        None => while coordinator.drive_one_tick() {},
    }
    coordinator.ticks() - start
}

/// Spawn a follower that observes every tick until the session ends.
fn spawn_follower(
    id: usize,
    coordinator: Arc<StepCoordinator>,
) -> std::io::Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name(format!("simhal-follower-{id}"))
        .spawn(move || {
            let mut rounds = 0u64;
            while coordinator.wait_until_next_tick() {
                rounds += 1;
                debug!("Follower {} at tick {}", id, coordinator.ticks());
            }
            rounds
        })
}

/// Setup tracing subscriber based on CLI arguments and config.
fn setup_tracing(args: &Args, config: &SimHalConfig) {
    let level = if args.verbose {
        "debug"
    } else {
        config.shared.log_level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .init();
    }
}
