//! SetuIO - Telemetry bridge daemon for the ASV ground station
//!
//! ## Data Flow
//!
//! - **Serial in**: the vehicle MCU emits `LAT:..,LON:..,SOG:..,COG:..`
//!   lines; each fix replaces the team's record and is broadcast.
//! - **TCP out**: dashboard viewers connect, replay the current state
//!   snapshot, then receive live updates, images and a 1Hz heartbeat.
//! - **Commands back**: viewers send rudder commands that are written
//!   to the serial link as `CENTER:`/`RUDDER:` lines.

use setu_io::battery::BatterySimulator;
use setu_io::config::AppConfig;
use setu_io::devices::asv::AsvDriver;
use setu_io::error::{Error, Result};
use setu_io::state::TeamStateStore;
use setu_io::streaming::{
    BroadcastHub, ConnectionLedger, FrameRateLimiter, HubSender, Serializer, ViewerContext,
    WireFormat,
};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `setu-io <path>` (positional)
/// - `setu-io --config <path>` (flag-based)
/// - `setu-io -c <path>` (short flag)
///
/// Defaults to `/etc/setuio.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/setuio.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = if std::path::Path::new(&config_path).exists() {
        AppConfig::from_file(&config_path)?
    } else {
        let mut config = AppConfig::asv_defaults();
        config.apply_env_overrides();
        config
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.logging.level),
    )
    .init();

    log::info!("SetuIO v0.2.0 starting...");
    log::info!("Using config: {}", config_path);

    let wire_format = WireFormat::from_name(&config.stream.wire_format).ok_or_else(|| {
        Error::Config(format!("Unknown wire format: {}", config.stream.wire_format))
    })?;
    log::info!("Wire format: {:?}", wire_format);

    // Shared components
    let queue = HubSender::new_queue();
    let hub_sender = HubSender::new(Arc::clone(&queue));
    let store = Arc::new(TeamStateStore::new());
    let battery = Arc::new(BatterySimulator::new(
        config.battery.initial_level,
        Duration::from_secs(config.battery.drain_period_secs),
    ));
    let driver = Arc::new(AsvDriver::new(
        &config.serial,
        Arc::clone(&store),
        hub_sender.clone(),
        Arc::clone(&battery),
    ));

    if config.serial.eager_connect {
        // The link stays closed on failure; the next camera_ready
        // event retries
        if let Err(e) = driver.ensure_link_open() {
            log::error!("Serial link unavailable at startup: {}", e);
        }
    } else {
        log::info!("Serial link will open on the first camera_ready event");
    }

    let ctx = Arc::new(ViewerContext {
        store: Arc::clone(&store),
        limiter: FrameRateLimiter::new(Duration::from_millis(config.stream.frame_window_ms)),
        driver: Arc::clone(&driver),
        hub: hub_sender,
        battery: Arc::clone(&battery),
        ledger: ConnectionLedger::default(),
    });

    let hub = BroadcastHub::start(
        &config.network.bind_address,
        Serializer::new(wire_format),
        Arc::clone(&ctx),
        queue,
    )?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("SetuIO running. Press Ctrl-C to stop.");

    // Main loop: periodic status line until shutdown
    let mut last_status = Instant::now();
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if last_status.elapsed() >= Duration::from_secs(10) {
            last_status = Instant::now();
            log::info!(
                "Status: {} viewer(s), {} team(s), battery {:.1}%, link {}",
                ctx.ledger.viewers(),
                store.len(),
                battery.level(),
                if driver.is_link_open() { "open" } else { "closed" }
            );
        }
    }

    // Shutdown
    log::info!("Shutting down...");
    hub.stop();
    drop(hub);
    battery.shutdown();
    driver.close();

    log::info!("SetuIO stopped");
    Ok(())
}
