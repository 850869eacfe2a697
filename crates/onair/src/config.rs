//! Core configuration and defaults

use std::time::Duration;

/// Hostname announced on every interface and used as the hotspot SSID.
pub const DEFAULT_HOSTNAME: &str = "onair-setup";

/// Service type advertised by the switcher.
pub const DEFAULT_SERVICE_TYPE: &str = "_blackmagic._tcp.local.";

/// Blink period while the switcher is connecting or stopping a stream.
pub const DEFAULT_BLINK_PERIOD: Duration = Duration::from_millis(200);

/// Settings the core needs from the platform.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Hostname for the interfaces and the service-discovery responder
    pub hostname: String,
    /// Service type queried to find the switcher
    pub service_type: String,
    /// Light blink period
    pub blink_period: Duration,
    /// Whether the firmware update surface is enabled
    pub update_surface: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            blink_period: DEFAULT_BLINK_PERIOD,
            update_surface: true,
        }
    }
}
