//! Connectivity context: the one owned bundle of mutable core state

use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::interface::InterfaceTracker;
use crate::tally::{BlinkTimer, Level, LightState};

/// Discovered switcher address. Set by the first accepted discovery result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwitcherEndpoint {
    pub address: Option<IpAddr>,
    pub discovered: bool,
}

impl SwitcherEndpoint {
    pub(crate) fn accept(&mut self, address: IpAddr) {
        self.address = Some(address);
        self.discovered = true;
    }

    pub(crate) fn forget(&mut self) {
        self.address = None;
        self.discovered = false;
    }
}

/// State shared by the arbiter, discovery gate and tally driver.
///
/// Owned by the controller and passed by `&mut` into each step, so tests can
/// build one directly and inspect it after every call.
#[derive(Debug, Clone)]
pub struct ConnectivityContext {
    pub interfaces: InterfaceTracker,
    pub endpoint: SwitcherEndpoint,
    pub blink: BlinkTimer,
    pub light: LightState,
    pub level: Level,
    /// Wireless reached an address at least once since boot
    pub wireless_worked: bool,
    /// The arbiter switched the radio off in favour of wired
    pub wireless_suppressed: bool,
}

impl ConnectivityContext {
    pub fn new(blink_period: Duration, now: Instant) -> Self {
        Self {
            interfaces: InterfaceTracker::new(),
            endpoint: SwitcherEndpoint::default(),
            blink: BlinkTimer::new(blink_period, now),
            light: LightState::Off,
            level: Level::Low,
            wireless_worked: false,
            wireless_suppressed: false,
        }
    }
}
