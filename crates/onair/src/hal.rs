//! Collaborator traits
//!
//! The core never touches sockets, radios or pins directly. The platform
//! provides these implementations; tests provide recording fakes.

use std::io;
use std::net::IpAddr;

use crate::interface::InterfaceKind;
use crate::session::StreamState;
use crate::tally::Level;

/// Interface selection primitives of the network stack.
pub trait NetworkDriver {
    /// Turn the wireless radio on (station mode) or off.
    fn set_wireless_enabled(&mut self, enabled: bool);
    /// Enable or disable automatic reconnection of the wireless station.
    fn set_auto_reconnect(&mut self, enabled: bool);
    fn set_hostname(&mut self, kind: InterfaceKind, hostname: &str);
    /// Ask the wireless station to join its saved network again.
    fn reconnect_wireless(&mut self);
    /// Host a local access point for configuration.
    fn start_hotspot(&mut self, ssid: &str);
}

/// Local-network service discovery.
pub trait ServiceDiscovery {
    /// Announce this device under `hostname`.
    fn register_name(&mut self, hostname: &str) -> anyhow::Result<()>;
    /// Addresses currently advertising `service_type`, in discovery order.
    fn query_service(&mut self, service_type: &str) -> Vec<IpAddr>;
}

/// Switcher control session. `connect` and `poll` must not block.
pub trait SwitcherClient {
    fn bind(&mut self, address: IpAddr);
    /// Start the handshake. Completion shows up through `is_connected`.
    fn connect(&mut self);
    /// Drive receive, acknowledgement, keepalive and retry.
    fn poll(&mut self);
    fn is_connected(&self) -> bool;
    fn stream_state(&self) -> StreamState;
}

/// Physical light output.
pub trait OutputPin {
    fn set_level(&mut self, level: Level);
}

/// Firmware image replacement.
pub trait ImageWriter {
    /// Open a transaction. `None` means the final size is unknown.
    fn begin(&mut self, expected_size: Option<u64>) -> io::Result<()>;
    /// Write a chunk, returning how many bytes were accepted.
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize>;
    /// Close the transaction. With `mark_complete` the new image becomes the
    /// boot image.
    fn finalize(&mut self, mark_complete: bool) -> io::Result<()>;
}

/// Full device restart.
pub trait Restart {
    fn restart(&mut self);
}
