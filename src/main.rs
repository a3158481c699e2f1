//! # GPS Relay
//!
//! Relay GPS positions from a serial-attached node to a tracking server.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use gps_relay::cli::Args;
use gps_relay::forwarder::HttpForwarder;
use gps_relay::logging;
use gps_relay::relay::Relay;
use gps_relay::serial::GpsSerial;

/// Main entry point for GPS Relay
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (file and command line overrides)
///    - Set up logging with tracing subscriber
///    - Open the serial port; failure ends the process here
///    - Build the HTTP client
///
/// 2. **Main Loop**
///    - Wait for a line, parse it, post it if it carries a position
///    - Log and move on after any per-line failure
///
/// 3. **Shutdown**
///    - Ctrl+C or a serial read error ends the loop
///    - Log relay stats and release the port
///
/// Everything runs on a single thread; lines are handled one at a time.
///
/// # Examples
///
/// ```bash
/// cargo run --release -- --config config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO gps_relay: GPS Relay v0.1.0 starting...
/// INFO gps_relay::serial: Opened GPS serial port at /dev/ttyUSB0 (115200 baud)
/// INFO gps_relay::relay: Received line: {"latitude": -6.2, "longitude": 106.8}
/// INFO gps_relay::relay: Forwarded position (latitude -6.2, longitude 106.8)
/// ```
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    let _log_guard = logging::init(&config.logging);

    info!("GPS Relay v{} starting...", env!("CARGO_PKG_VERSION"));

    let serial = GpsSerial::open(&config.serial)?;
    let forwarder = HttpForwarder::new(&config.forwarder)?;
    info!(
        "Relaying positions from {} to {} as node {}",
        serial.device_path(),
        forwarder.url(),
        forwarder.node_id()
    );
    if config.forwarder.timeout_ms.is_none() {
        info!("No request timeout configured; a hung server blocks the relay");
    }

    let mut relay = Relay::new(serial.into_lines(), forwarder);
    info!("Press Ctrl+C to exit");

    let finished = tokio::select! {
        result = relay.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    if finished.is_none() {
        info!("Received Ctrl+C, shutting down...");
    }
    relay.stats().log_summary();

    // Closes the serial port
    drop(relay);

    if let Some(result) = finished {
        result?;
    }

    Ok(())
}
