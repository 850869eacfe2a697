//! Interface status tracking
//!
//! Latest view of the wired and wireless interfaces, updated only by the
//! arbiter as lifecycle events are dispatched. All queries are plain reads.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

use crate::event::Addressing;

/// The two physical network paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Wired,
    Wireless,
}

impl InterfaceKind {
    /// Short label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            InterfaceKind::Wired => "wired",
            InterfaceKind::Wireless => "wireless",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State of one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceState {
    pub administratively_up: bool,
    pub link_up: bool,
    pub has_address: bool,
    pub address: Option<IpAddr>,
    pub netmask: Option<IpAddr>,
    pub gateway: Option<IpAddr>,
}

impl InterfaceState {
    fn assign(&mut self, addressing: Addressing) {
        self.link_up = true;
        self.has_address = true;
        self.address = Some(addressing.address);
        self.netmask = addressing.netmask;
        self.gateway = addressing.gateway;
    }

    fn clear_address(&mut self) {
        self.has_address = false;
        self.address = None;
        self.netmask = None;
        self.gateway = None;
    }
}

/// Network stack status bits, derived from the interface states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBits(pub u16);

impl StatusBits {
    pub const WIRED_STARTED: u16 = 0b0000_0001;
    pub const WIRED_CONNECTED: u16 = 0b0000_0010;
    pub const WIRED_HAS_IP: u16 = 0b0000_0100;
    pub const WIRELESS_STARTED: u16 = 0b0000_1000;
    pub const WIRELESS_CONNECTED: u16 = 0b0001_0000;
    pub const WIRELESS_HAS_IP: u16 = 0b0010_0000;
    pub const HOTSPOT_STARTED: u16 = 0b0100_0000;

    /// Check whether every bit in `mask` is set
    pub fn contains(&self, mask: u16) -> bool {
        self.0 & mask == mask
    }

    fn set(&mut self, mask: u16, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }
}

impl fmt::Display for StatusBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Tracker for both interfaces plus the configuration hotspot.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTracker {
    wired: InterfaceState,
    wireless: InterfaceState,
    hotspot: bool,
}

impl InterfaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: InterfaceKind) -> &InterfaceState {
        match kind {
            InterfaceKind::Wired => &self.wired,
            InterfaceKind::Wireless => &self.wireless,
        }
    }

    fn state_mut(&mut self, kind: InterfaceKind) -> &mut InterfaceState {
        match kind {
            InterfaceKind::Wired => &mut self.wired,
            InterfaceKind::Wireless => &mut self.wireless,
        }
    }

    pub fn bits(&self) -> StatusBits {
        let mut bits = StatusBits::default();
        bits.set(StatusBits::WIRED_STARTED, self.wired.administratively_up);
        bits.set(StatusBits::WIRED_CONNECTED, self.wired.link_up);
        bits.set(StatusBits::WIRED_HAS_IP, self.wired.has_address);
        bits.set(StatusBits::WIRELESS_STARTED, self.wireless.administratively_up);
        bits.set(StatusBits::WIRELESS_CONNECTED, self.wireless.link_up);
        bits.set(StatusBits::WIRELESS_HAS_IP, self.wireless.has_address);
        bits.set(StatusBits::HOTSPOT_STARTED, self.hotspot);
        bits
    }

    pub fn is_wired_up(&self) -> bool {
        self.wired.link_up
    }

    pub fn is_wireless_up(&self) -> bool {
        self.wireless.link_up
    }

    pub fn is_hotspot_up(&self) -> bool {
        self.hotspot
    }

    pub fn is_network_up(&self) -> bool {
        self.is_wired_up() || self.is_wireless_up()
    }

    /// True once any interface holds an address. This is what the tally
    /// driver treats as "network ready".
    pub fn has_address(&self) -> bool {
        self.wired.has_address || self.wireless.has_address
    }

    /// The interface whose address is in use. Wired wins if both report one.
    pub fn active(&self) -> Option<InterfaceKind> {
        if self.wired.has_address {
            Some(InterfaceKind::Wired)
        } else if self.wireless.has_address {
            Some(InterfaceKind::Wireless)
        } else {
            None
        }
    }

    pub fn local_ip(&self) -> Option<IpAddr> {
        self.active().and_then(|kind| self.state(kind).address)
    }

    pub fn netmask(&self) -> Option<IpAddr> {
        self.active().and_then(|kind| self.state(kind).netmask)
    }

    pub fn gateway(&self) -> Option<IpAddr> {
        self.active().and_then(|kind| self.state(kind).gateway)
    }

    pub(crate) fn set_admin(&mut self, kind: InterfaceKind, up: bool) {
        let state = self.state_mut(kind);
        state.administratively_up = up;
        if !up {
            state.link_up = false;
            state.clear_address();
        }
    }

    pub(crate) fn set_link(&mut self, kind: InterfaceKind, up: bool) {
        let state = self.state_mut(kind);
        state.link_up = up;
        if !up {
            state.clear_address();
        }
    }

    pub(crate) fn set_address(&mut self, kind: InterfaceKind, addressing: Addressing) {
        let state = self.state_mut(kind);
        state.administratively_up = true;
        state.assign(addressing);
    }

    pub(crate) fn set_hotspot(&mut self, up: bool) {
        self.hotspot = up;
    }
}
