//! Runtime configuration from environment and command-line flags

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use onair::CoreConfig;

/// Port the switcher listens on for control sessions.
pub const DEFAULT_SWITCHER_PORT: u16 = 9910;

/// GPIO line the light is wired to on the reference board.
const DEFAULT_LIGHT_PIN: u32 = 15;

/// Firmware configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname, service type, blink period and update switch for the core
    pub core: CoreConfig,
    /// GPIO line driving the light
    pub light_pin: u32,
    /// sysfs GPIO root
    pub gpio_root: PathBuf,
    /// Control loop period
    pub cycle: Duration,
    /// Serve the administrative web surface
    pub admin: bool,
    pub admin_bind: SocketAddr,
    pub switcher_port: u16,
    /// Interface name prefixes treated as wired
    pub wired_prefixes: Vec<String>,
    /// Interface name prefixes treated as wireless
    pub wireless_prefixes: Vec<String>,
    /// How often interface addresses are sampled
    pub net_poll: Duration,
    /// Ignore wired interfaces and treat everything else as wireless
    pub simulator: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_lookup(&args, |key| std::env::var(key).ok())
    }

    fn from_lookup(args: &[String], var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let simulator = args.iter().any(|arg| arg == "--simulator");
        let no_admin = args.iter().any(|arg| arg == "--no-admin");

        let number = |key: &str, default: u64| -> u64 {
            var(key).and_then(|s| s.parse().ok()).unwrap_or(default)
        };
        let prefixes = |key: &str, default: &str| -> Vec<String> {
            var(key)
                .unwrap_or_else(|| default.to_string())
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        };

        let defaults = CoreConfig::default();
        let hostname = var("ONAIR_HOSTNAME").unwrap_or(defaults.hostname);
        let service_type = var("ONAIR_SERVICE_TYPE").unwrap_or(defaults.service_type);
        let blink_period = Duration::from_millis(number(
            "ONAIR_BLINK_MS",
            defaults.blink_period.as_millis() as u64,
        ));

        // Admin surface enabled by default, disable with ONAIR_ADMIN=0 or --no-admin
        let admin = !no_admin && var("ONAIR_ADMIN").map(|v| v != "0").unwrap_or(true);

        let admin_bind: SocketAddr = var("ONAIR_ADMIN_BIND")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("Invalid ONAIR_ADMIN_BIND address")?;

        let switcher_port = var("ONAIR_SWITCHER_PORT")
            .map(|s| s.parse::<u16>().context("Invalid ONAIR_SWITCHER_PORT"))
            .transpose()?
            .unwrap_or(DEFAULT_SWITCHER_PORT);

        let light_pin = var("ONAIR_LIGHT_PIN")
            .map(|s| s.parse::<u32>().context("Invalid ONAIR_LIGHT_PIN"))
            .transpose()?
            .unwrap_or(DEFAULT_LIGHT_PIN);

        Ok(Self {
            core: CoreConfig {
                hostname,
                service_type,
                blink_period,
                update_surface: admin,
            },
            light_pin,
            gpio_root: var("ONAIR_GPIO_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/sys/class/gpio")),
            cycle: Duration::from_millis(number("ONAIR_CYCLE_MS", 10).max(1)),
            admin,
            admin_bind,
            switcher_port,
            wired_prefixes: prefixes("ONAIR_WIRED_PREFIXES", "eth,en"),
            wireless_prefixes: prefixes("ONAIR_WIRELESS_PREFIXES", "wl"),
            net_poll: Duration::from_millis(number("ONAIR_NET_POLL_MS", 1000).max(50)),
            simulator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], vars: &[(&str, &str)]) -> Result<Config> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(&args, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&["onair-firmware"], &[]).unwrap();
        assert_eq!(config.core.hostname, "onair-setup");
        assert_eq!(config.core.service_type, "_blackmagic._tcp.local.");
        assert_eq!(config.core.blink_period, Duration::from_millis(200));
        assert_eq!(config.light_pin, 15);
        assert_eq!(config.cycle, Duration::from_millis(10));
        assert_eq!(config.switcher_port, 9910);
        assert_eq!(config.wired_prefixes, vec!["eth", "en"]);
        assert_eq!(config.wireless_prefixes, vec!["wl"]);
        assert_eq!(config.admin_bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert!(config.admin);
        assert!(config.core.update_surface);
        assert!(!config.simulator);
    }

    #[test]
    fn test_env_overrides() {
        let config = load(
            &["onair-firmware", "--simulator"],
            &[
                ("ONAIR_HOSTNAME", "studio-b"),
                ("ONAIR_BLINK_MS", "500"),
                ("ONAIR_LIGHT_PIN", "4"),
                ("ONAIR_WIRED_PREFIXES", "eno, enp ,"),
                ("ONAIR_SWITCHER_PORT", "9911"),
            ],
        )
        .unwrap();
        assert_eq!(config.core.hostname, "studio-b");
        assert_eq!(config.core.blink_period, Duration::from_millis(500));
        assert_eq!(config.light_pin, 4);
        assert_eq!(config.wired_prefixes, vec!["eno", "enp"]);
        assert_eq!(config.switcher_port, 9911);
        assert!(config.simulator);
    }

    #[test]
    fn test_admin_disabled_turns_off_updates() {
        let config = load(&["onair-firmware", "--no-admin"], &[]).unwrap();
        assert!(!config.admin);
        assert!(!config.core.update_surface);

        let config = load(&["onair-firmware"], &[("ONAIR_ADMIN", "0")]).unwrap();
        assert!(!config.admin);
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&["onair-firmware"], &[("ONAIR_ADMIN_BIND", "nope")]).is_err());
        assert!(load(&["onair-firmware"], &[("ONAIR_SWITCHER_PORT", "99999")]).is_err());
        assert!(load(&["onair-firmware"], &[("ONAIR_LIGHT_PIN", "4294967296")]).is_err());
        assert!(load(&["onair-firmware"], &[("ONAIR_LIGHT_PIN", "-1")]).is_err());

        // Unparseable numbers fall back to defaults
        let config = load(&["onair-firmware"], &[("ONAIR_CYCLE_MS", "fast")]).unwrap();
        assert_eq!(config.cycle, Duration::from_millis(10));
    }
}
