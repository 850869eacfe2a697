//! Light output pin
//!
//! Drives the light through the sysfs GPIO interface. Hosts without the GPIO
//! line get a pin that only logs level changes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use onair::hal::OutputPin;
use onair::Level;
use tracing::{info, warn};

/// Open the light pin, falling back to a logging pin.
pub fn open_light(root: &Path, pin: u32) -> Box<dyn OutputPin + Send> {
    match SysfsPin::open(root, pin) {
        Ok(pin) => Box::new(pin),
        Err(e) => {
            warn!("GPIO {} unavailable ({:#}), light changes will only be logged", pin, e);
            Box::new(LogPin::default())
        }
    }
}

/// Output line under `<root>/gpio<N>`.
pub struct SysfsPin {
    value_path: PathBuf,
    current: Option<Level>,
}

impl SysfsPin {
    pub fn open(root: &Path, pin: u32) -> Result<Self> {
        let dir = root.join(format!("gpio{pin}"));
        if !dir.exists() {
            fs::write(root.join("export"), pin.to_string())
                .with_context(|| format!("Failed to export GPIO {pin}"))?;
        }
        fs::write(dir.join("direction"), "out")
            .with_context(|| format!("Failed to set GPIO {pin} direction"))?;

        info!("Light on GPIO {} ({:?})", pin, dir);
        let mut pin = Self {
            value_path: dir.join("value"),
            current: None,
        };
        pin.set_level(Level::Low);
        Ok(pin)
    }
}

impl OutputPin for SysfsPin {
    fn set_level(&mut self, level: Level) {
        if self.current == Some(level) {
            return;
        }
        let value = if level.is_high() { "1" } else { "0" };
        match fs::write(&self.value_path, value) {
            Ok(()) => self.current = Some(level),
            Err(e) => warn!("Failed to write light level: {}", e),
        }
    }
}

/// Pin that logs level changes.
#[derive(Default)]
pub struct LogPin {
    current: Option<Level>,
}

impl OutputPin for LogPin {
    fn set_level(&mut self, level: Level) {
        if self.current != Some(level) {
            info!("Light {}", if level.is_high() { "ON" } else { "off" });
            self.current = Some(level);
        }
    }
}
