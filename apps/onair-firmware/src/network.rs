//! Host network driver and interface watcher
//!
//! The host has no radio to switch, so the driver records what the arbiter
//! asked for in [`RadioControl`] and the watcher honours it: while wireless is
//! disabled its addresses are hidden from the core. The watcher samples the
//! interface addresses periodically and turns the differences into
//! lifecycle events.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use if_addrs::{get_if_addrs, IfAddr};
use onair::hal::NetworkDriver;
use onair::{Addressing, InterfaceKind, NetworkEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Radio switches shared between the driver and the watcher.
#[derive(Debug)]
pub struct RadioControl {
    wireless_enabled: AtomicBool,
    hotspot: Mutex<Option<String>>,
}

impl Default for RadioControl {
    fn default() -> Self {
        Self {
            wireless_enabled: AtomicBool::new(true),
            hotspot: Mutex::new(None),
        }
    }
}

impl RadioControl {
    pub fn wireless_enabled(&self) -> bool {
        self.wireless_enabled.load(Ordering::SeqCst)
    }

    fn take_hotspot(&self) -> Option<String> {
        self.hotspot.lock().ok().and_then(|mut h| h.take())
    }
}

/// `NetworkDriver` for a host operating system.
pub struct HostNetwork {
    radio: Arc<RadioControl>,
}

impl HostNetwork {
    pub fn new(radio: Arc<RadioControl>) -> Self {
        Self { radio }
    }
}

impl NetworkDriver for HostNetwork {
    fn set_wireless_enabled(&mut self, enabled: bool) {
        info!("Wireless {}", if enabled { "enabled" } else { "disabled" });
        self.radio.wireless_enabled.store(enabled, Ordering::SeqCst);
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        // The OS network manager owns reconnection on a host
        debug!("Wireless auto-reconnect: {}", enabled);
    }

    fn set_hostname(&mut self, kind: InterfaceKind, hostname: &str) {
        // Host names belong to the OS; only the mDNS responder uses ours
        debug!("Hostname for {} interface: {}", kind, hostname);
    }

    fn reconnect_wireless(&mut self) {
        info!("Wireless reconnect requested");
    }

    fn start_hotspot(&mut self, ssid: &str) {
        warn!("Configuration hotspot '{}' requested, hosts join networks through the OS", ssid);
        if let Ok(mut hotspot) = self.radio.hotspot.lock() {
            *hotspot = Some(ssid.to_string());
        }
    }
}

/// Which interfaces count as wired and wireless.
#[derive(Debug, Clone)]
pub struct Classifier {
    pub wired_prefixes: Vec<String>,
    pub wireless_prefixes: Vec<String>,
    /// Skip wired entirely, every other interface is wireless
    pub simulator: bool,
}

impl Classifier {
    pub fn classify(&self, name: &str) -> Option<InterfaceKind> {
        if self.simulator {
            return Some(InterfaceKind::Wireless);
        }
        if self.wired_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            Some(InterfaceKind::Wired)
        } else if self.wireless_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            Some(InterfaceKind::Wireless)
        } else {
            None
        }
    }
}

/// Addresses seen in one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkView {
    pub wired: Option<Addressing>,
    pub wireless: Option<Addressing>,
}

/// Sample interface addresses. The first IPv4 address of each kind wins.
pub fn sample(classifier: &Classifier) -> LinkView {
    let mut view = LinkView::default();
    let ifaces = match get_if_addrs() {
        Ok(ifaces) => ifaces,
        Err(e) => {
            warn!("Failed to list interfaces: {}", e);
            return view;
        }
    };

    for iface in ifaces {
        if iface.is_loopback() {
            continue;
        }
        let IfAddr::V4(v4) = &iface.addr else {
            continue;
        };
        let slot = match classifier.classify(&iface.name) {
            Some(InterfaceKind::Wired) => &mut view.wired,
            Some(InterfaceKind::Wireless) => &mut view.wireless,
            None => continue,
        };
        if slot.is_none() {
            *slot = Some(Addressing {
                address: IpAddr::V4(v4.ip),
                netmask: Some(IpAddr::V4(v4.netmask)),
                gateway: None,
            });
        }
    }
    view
}

/// Events that move the core from `prev` to `next`.
pub fn diff(prev: &LinkView, next: &LinkView) -> Vec<NetworkEvent> {
    let mut events = Vec::new();

    match (prev.wired, next.wired) {
        (None, Some(a)) => {
            events.push(NetworkEvent::WiredLinkUp);
            events.push(NetworkEvent::WiredAddressAcquired(a));
        }
        (Some(old), Some(new)) if old != new => {
            events.push(NetworkEvent::WiredAddressAcquired(new));
        }
        (Some(_), None) => events.push(NetworkEvent::WiredDisconnected),
        _ => {}
    }

    match (prev.wireless, next.wireless) {
        (None, Some(a)) => {
            events.push(NetworkEvent::WirelessLinkUp);
            events.push(NetworkEvent::WirelessAddressAcquired(a));
        }
        (Some(old), Some(new)) if old != new => {
            events.push(NetworkEvent::WirelessAddressAcquired(new));
        }
        (Some(_), None) => events.push(NetworkEvent::WirelessDisconnected),
        _ => {}
    }

    events
}

/// Sample forever, sending lifecycle events to the control loop.
pub async fn watch(
    classifier: Classifier,
    radio: Arc<RadioControl>,
    poll: Duration,
    tx: mpsc::UnboundedSender<NetworkEvent>,
) {
    let mut boot = Vec::new();
    if !classifier.simulator {
        boot.push(NetworkEvent::WiredStarted);
    }
    boot.push(NetworkEvent::WirelessStationStart);
    for event in boot {
        if tx.send(event).is_err() {
            return;
        }
    }

    let mut prev = LinkView::default();
    let mut first = true;
    let mut interval = tokio::time::interval(poll);

    loop {
        interval.tick().await;

        let mut next = sample(&classifier);
        if !radio.wireless_enabled() {
            next.wireless = None;
        }

        let mut events = diff(&prev, &next);
        // The station failed to join anything at boot
        if first && next.wireless.is_none() && radio.wireless_enabled() {
            events.push(NetworkEvent::WirelessDisconnected);
        }
        if radio.take_hotspot().is_some() {
            events.push(NetworkEvent::HotspotStarted);
        }
        first = false;
        prev = next;

        for event in events {
            if tx.send(event).is_err() {
                debug!("Control loop gone, network watcher stopping");
                return;
            }
        }
    }
}
