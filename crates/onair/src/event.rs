//! Network lifecycle events delivered by the platform

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// Address assignment carried by the address-acquired events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Addressing {
    pub address: IpAddr,
    pub netmask: Option<IpAddr>,
    pub gateway: Option<IpAddr>,
}

impl Addressing {
    /// Address without netmask or gateway information
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            netmask: None,
            gateway: None,
        }
    }
}

/// Interface lifecycle events, queued by the network stack and drained at
/// the top of every control cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    WiredStarted,
    WiredLinkUp,
    WiredAddressAcquired(Addressing),
    WiredDisconnected,
    WiredStopped,
    WirelessStationStart,
    WirelessLinkUp,
    WirelessAddressAcquired(Addressing),
    WirelessDisconnected,
    WirelessStationStop,
    HotspotStarted,
    HotspotStopped,
    /// Anything else the stack reports (scan done, client joined the
    /// hotspot, ...). Logged and otherwise ignored.
    Other(String),
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEvent::WiredStarted => write!(f, "wired-started"),
            NetworkEvent::WiredLinkUp => write!(f, "wired-link-up"),
            NetworkEvent::WiredAddressAcquired(a) => {
                write!(f, "wired-address-acquired({})", a.address)
            }
            NetworkEvent::WiredDisconnected => write!(f, "wired-disconnected"),
            NetworkEvent::WiredStopped => write!(f, "wired-stopped"),
            NetworkEvent::WirelessStationStart => write!(f, "wireless-station-start"),
            NetworkEvent::WirelessLinkUp => write!(f, "wireless-link-up"),
            NetworkEvent::WirelessAddressAcquired(a) => {
                write!(f, "wireless-address-acquired({})", a.address)
            }
            NetworkEvent::WirelessDisconnected => write!(f, "wireless-disconnected"),
            NetworkEvent::WirelessStationStop => write!(f, "wireless-station-stop"),
            NetworkEvent::HotspotStarted => write!(f, "hotspot-started"),
            NetworkEvent::HotspotStopped => write!(f, "hotspot-stopped"),
            NetworkEvent::Other(name) => write!(f, "{name}"),
        }
    }
}
