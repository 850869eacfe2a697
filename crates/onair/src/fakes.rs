//! Recording collaborators for unit tests

use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::hal::{ImageWriter, NetworkDriver, OutputPin, Restart, ServiceDiscovery, SwitcherClient};
use crate::interface::InterfaceKind;
use crate::session::StreamState;
use crate::tally::Level;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetCall {
    WirelessEnabled(bool),
    AutoReconnect(bool),
    Hostname(InterfaceKind, String),
    Reconnect,
    Hotspot(String),
}

#[derive(Clone, Default)]
pub struct FakeNetwork {
    calls: Arc<Mutex<Vec<NetCall>>>,
}

impl FakeNetwork {
    pub fn calls(&self) -> Vec<NetCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn push(&self, call: NetCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NetworkDriver for FakeNetwork {
    fn set_wireless_enabled(&mut self, enabled: bool) {
        self.push(NetCall::WirelessEnabled(enabled));
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        self.push(NetCall::AutoReconnect(enabled));
    }

    fn set_hostname(&mut self, kind: InterfaceKind, hostname: &str) {
        self.push(NetCall::Hostname(kind, hostname.to_string()));
    }

    fn reconnect_wireless(&mut self) {
        self.push(NetCall::Reconnect);
    }

    fn start_hotspot(&mut self, ssid: &str) {
        self.push(NetCall::Hotspot(ssid.to_string()));
    }
}

#[derive(Default)]
pub struct DiscoveryLog {
    pub results: Vec<IpAddr>,
    pub queries: usize,
    pub registrations: Vec<String>,
    pub fail_register: bool,
}

#[derive(Clone, Default)]
pub struct FakeDiscovery {
    pub log: Arc<Mutex<DiscoveryLog>>,
}

impl FakeDiscovery {
    pub fn answering(results: Vec<IpAddr>) -> Self {
        let fake = Self::default();
        fake.log.lock().unwrap().results = results;
        fake
    }

    pub fn set_results(&self, results: Vec<IpAddr>) {
        self.log.lock().unwrap().results = results;
    }

    pub fn queries(&self) -> usize {
        self.log.lock().unwrap().queries
    }
}

impl ServiceDiscovery for FakeDiscovery {
    fn register_name(&mut self, hostname: &str) -> anyhow::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.registrations.push(hostname.to_string());
        if log.fail_register {
            anyhow::bail!("responder unavailable");
        }
        Ok(())
    }

    fn query_service(&mut self, _service_type: &str) -> Vec<IpAddr> {
        let mut log = self.log.lock().unwrap();
        log.queries += 1;
        log.results.clone()
    }
}

#[derive(Default)]
pub struct SwitcherLog {
    pub bound: Option<IpAddr>,
    pub connects: usize,
    pub polls: usize,
    pub connected: bool,
    pub stream: Option<StreamState>,
}

#[derive(Clone, Default)]
pub struct FakeSwitcher {
    pub log: Arc<Mutex<SwitcherLog>>,
}

impl FakeSwitcher {
    pub fn set_connected(&self, connected: bool) {
        self.log.lock().unwrap().connected = connected;
    }

    pub fn set_stream(&self, stream: StreamState) {
        self.log.lock().unwrap().stream = Some(stream);
    }
}

impl SwitcherClient for FakeSwitcher {
    fn bind(&mut self, address: IpAddr) {
        self.log.lock().unwrap().bound = Some(address);
    }

    fn connect(&mut self) {
        self.log.lock().unwrap().connects += 1;
    }

    fn poll(&mut self) {
        self.log.lock().unwrap().polls += 1;
    }

    fn is_connected(&self) -> bool {
        self.log.lock().unwrap().connected
    }

    fn stream_state(&self) -> StreamState {
        self.log.lock().unwrap().stream.unwrap_or(StreamState::Idle)
    }
}

#[derive(Clone, Default)]
pub struct FakePin {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl FakePin {
    pub fn levels(&self) -> Vec<Level> {
        self.levels.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Level> {
        self.levels.lock().unwrap().last().copied()
    }
}

impl OutputPin for FakePin {
    fn set_level(&mut self, level: Level) {
        self.levels.lock().unwrap().push(level);
    }
}

#[derive(Default)]
pub struct ImageLog {
    pub begins: usize,
    pub data: Vec<u8>,
    pub finalized: Vec<bool>,
    /// Bytes to drop from the next write to simulate a short write
    pub short_by: usize,
    pub fail_begin: bool,
    pub fail_finalize: bool,
}

#[derive(Clone, Default)]
pub struct FakeImage {
    pub log: Arc<Mutex<ImageLog>>,
}

impl ImageWriter for FakeImage {
    fn begin(&mut self, _expected_size: Option<u64>) -> io::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.begins += 1;
        if log.fail_begin {
            return Err(io::Error::new(io::ErrorKind::Other, "no partition"));
        }
        log.data.clear();
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        let mut log = self.log.lock().unwrap();
        let accepted = chunk.len().saturating_sub(log.short_by);
        log.data.extend_from_slice(&chunk[..accepted]);
        Ok(accepted)
    }

    fn finalize(&mut self, mark_complete: bool) -> io::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.finalized.push(mark_complete);
        if log.fail_finalize {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad image"));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeRestart {
    count: Arc<AtomicUsize>,
}

impl FakeRestart {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Restart for FakeRestart {
    fn restart(&mut self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
