//! onair Firmware Binary
//!
//! Tally light for a network video switcher: finds the switcher over mDNS,
//! follows its streaming status and drives the light on a GPIO line.
//!
//! ## Usage
//!
//! ```bash
//! # Wired or wireless, whichever gets an address
//! onair-firmware
//!
//! # Treat every interface as wireless (development machines)
//! onair-firmware --simulator
//!
//! # No web surface, no firmware uploads
//! onair-firmware --no-admin
//!
//! # Light on another pin, slower blink
//! ONAIR_LIGHT_PIN=4 ONAIR_BLINK_MS=400 onair-firmware
//! ```

mod admin;
mod config;
mod control;
mod gpio;
mod image;
mod mdns;
mod network;
mod protocol;
mod switcher;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use onair::{Collaborators, Controller};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::Config;
use crate::image::{ExitRestart, StagedImage, UPDATE_EXIT_CODE};
use crate::network::{Classifier, HostNetwork, RadioControl};

/// Time for the upload response to reach the browser before exiting.
const RESTART_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("onair=info".parse()?)
                .add_directive("onair_firmware=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    info!("onair firmware {} starting", env!("ONAIR_GIT_SHA"));
    info!("  Hostname: {}", config.core.hostname);
    info!("  Service: {}", config.core.service_type);
    info!("  Light: GPIO {} (blink {:?})", config.light_pin, config.core.blink_period);
    info!(
        "  Admin: {}",
        if config.admin { config.admin_bind.to_string() } else { "disabled".to_string() }
    );
    info!("  Simulator: {}", config.simulator);

    let radio = Arc::new(RadioControl::default());
    let (restart, restart_rx) = ExitRestart::new();

    let parts = Collaborators {
        network: Box::new(HostNetwork::new(radio.clone())),
        discovery: Box::new(mdns::MdnsDiscovery::new(config.admin_bind.port())?),
        switcher: Box::new(switcher::UdpSwitcher::new(config.switcher_port)),
        light: gpio::open_light(&config.gpio_root, config.light_pin),
        image: Box::new(StagedImage::for_current_exe()?),
        restart: Box::new(restart),
    };
    let controller = Controller::new(&config.core, parts, Instant::now());
    // Without the update surface the controller drops the restart hook
    let restart_rx = config.core.update_surface.then_some(restart_rx);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (handle, _control_thread) = control::spawn(controller, event_rx, config.cycle)?;

    let classifier = Classifier {
        wired_prefixes: config.wired_prefixes.clone(),
        wireless_prefixes: config.wireless_prefixes.clone(),
        simulator: config.simulator,
    };
    tokio::spawn(network::watch(classifier, radio, config.net_poll, event_tx));

    if config.admin {
        let bind = config.admin_bind;
        tokio::spawn(async move {
            if let Err(e) = admin::start(handle, bind).await {
                error!("Admin server stopped: {:#}", e);
            }
        });
    }

    tokio::select! {
        requested = image::restart_requested(restart_rx) => {
            requested?;
            info!("Restarting into new firmware (exit code {})", UPDATE_EXIT_CODE);
            tokio::time::sleep(RESTART_GRACE).await;
            std::process::exit(UPDATE_EXIT_CODE);
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("Shutting down");
        }
    }

    Ok(())
}
