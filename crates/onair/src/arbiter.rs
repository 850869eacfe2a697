//! Interface arbitration
//!
//! Running the wired and wireless paths at the same time gave inconsistent
//! discovery results, so the arbiter keeps exactly one of them active:
//! - wired address acquired → wireless radio off, auto-reconnect off
//! - wired lost → wireless back on if the arbiter turned it off
//! - wireless lost before it ever worked, with no wired link → hotspot
//!
//! The dispatcher is total over [`NetworkEvent`]; nothing here fails.

use tracing::{debug, info};

use crate::context::ConnectivityContext;
use crate::event::NetworkEvent;
use crate::hal::NetworkDriver;
use crate::interface::InterfaceKind;

/// Apply one lifecycle event.
///
/// Returns the interface that just became ready when Network-Ready Setup
/// (name registration and switcher discovery) should run.
pub fn dispatch(
    event: &NetworkEvent,
    ctx: &mut ConnectivityContext,
    network: &mut dyn NetworkDriver,
    hostname: &str,
) -> Option<InterfaceKind> {
    info!("Network event: {} (status {})", event, ctx.interfaces.bits());

    match event {
        NetworkEvent::WiredStarted => {
            ctx.interfaces.set_admin(InterfaceKind::Wired, true);
            network.set_hostname(InterfaceKind::Wired, hostname);
            None
        }
        NetworkEvent::WiredLinkUp => {
            ctx.interfaces.set_admin(InterfaceKind::Wired, true);
            ctx.interfaces.set_link(InterfaceKind::Wired, true);
            None
        }
        NetworkEvent::WiredAddressAcquired(addressing) => {
            ctx.interfaces.set_address(InterfaceKind::Wired, *addressing);
            info!(
                "Wired address {} for {}, switching wireless off",
                addressing.address, hostname
            );
            suppress_wireless(ctx, network);
            Some(InterfaceKind::Wired)
        }
        NetworkEvent::WiredDisconnected => {
            ctx.interfaces.set_link(InterfaceKind::Wired, false);
            restore_wireless(ctx, network);
            None
        }
        NetworkEvent::WiredStopped => {
            ctx.interfaces.set_admin(InterfaceKind::Wired, false);
            restore_wireless(ctx, network);
            None
        }
        NetworkEvent::WirelessStationStart => {
            if ctx.interfaces.state(InterfaceKind::Wired).has_address {
                debug!("Wireless started while wired holds an address");
                suppress_wireless(ctx, network);
                return None;
            }
            ctx.interfaces.set_admin(InterfaceKind::Wireless, true);
            network.set_hostname(InterfaceKind::Wireless, hostname);
            network.set_auto_reconnect(true);
            None
        }
        NetworkEvent::WirelessLinkUp => {
            if ctx.interfaces.state(InterfaceKind::Wired).has_address {
                suppress_wireless(ctx, network);
                return None;
            }
            ctx.interfaces.set_link(InterfaceKind::Wireless, true);
            None
        }
        NetworkEvent::WirelessAddressAcquired(addressing) => {
            if ctx.interfaces.state(InterfaceKind::Wired).has_address {
                info!("Wireless address {} refused, wired is active", addressing.address);
                suppress_wireless(ctx, network);
                return None;
            }
            ctx.interfaces.set_address(InterfaceKind::Wireless, *addressing);
            ctx.wireless_worked = true;
            info!("Wireless address {} for {}", addressing.address, hostname);
            Some(InterfaceKind::Wireless)
        }
        NetworkEvent::WirelessDisconnected => {
            ctx.interfaces.set_link(InterfaceKind::Wireless, false);
            if ctx.wireless_suppressed {
                debug!("Wireless down as requested");
            } else if ctx.wireless_worked {
                info!("Wireless worked before, waiting for reconnect");
            } else if ctx.interfaces.is_wired_up() {
                info!("Wired is up, no hotspot needed");
            } else {
                info!("Wireless never connected, starting hotspot {}", hostname);
                network.start_hotspot(hostname);
            }
            None
        }
        NetworkEvent::WirelessStationStop => {
            ctx.interfaces.set_admin(InterfaceKind::Wireless, false);
            None
        }
        NetworkEvent::HotspotStarted => {
            ctx.interfaces.set_hotspot(true);
            None
        }
        NetworkEvent::HotspotStopped => {
            ctx.interfaces.set_hotspot(false);
            None
        }
        NetworkEvent::Other(_) => None,
    }
}

fn suppress_wireless(ctx: &mut ConnectivityContext, network: &mut dyn NetworkDriver) {
    network.set_auto_reconnect(false);
    network.set_wireless_enabled(false);
    ctx.interfaces.set_admin(InterfaceKind::Wireless, false);
    ctx.wireless_suppressed = true;
}

fn restore_wireless(ctx: &mut ConnectivityContext, network: &mut dyn NetworkDriver) {
    if !ctx.wireless_suppressed {
        return;
    }
    info!("Wired lost, re-enabling wireless");
    network.set_wireless_enabled(true);
    network.set_auto_reconnect(true);
    network.reconnect_wireless();
    ctx.wireless_suppressed = false;
}
