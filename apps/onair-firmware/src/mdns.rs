//! mDNS responder and switcher browser
//!
//! Queries never block: the first query starts a background browse and every
//! call returns whatever has been resolved so far.

use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::{Context, Result};
use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use onair::hal::ServiceDiscovery;
use tracing::{debug, info};

/// Service type announced for the administrative surface.
const ADMIN_SERVICE_TYPE: &str = "_http._tcp.local.";

pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
    admin_port: u16,
    registered: Option<String>,
    browse: Option<(String, Receiver<ServiceEvent>)>,
    /// Resolved instances in discovery order: (full name, addresses)
    resolved: Vec<(String, Vec<IpAddr>)>,
}

impl MdnsDiscovery {
    pub fn new(admin_port: u16) -> Result<Self> {
        let daemon = ServiceDaemon::new().context("Failed to start mDNS daemon")?;
        Ok(Self {
            daemon,
            admin_port,
            registered: None,
            browse: None,
            resolved: Vec::new(),
        })
    }

    fn drain(&mut self) {
        let Some((_, rx)) = &self.browse else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
                    let name = info.get_fullname().to_string();
                    debug!("Resolved {} at {:?}", name, addresses);
                    upsert(&mut self.resolved, name, addresses);
                }
                ServiceEvent::ServiceRemoved(_, name) => {
                    debug!("Service removed: {}", name);
                    self.resolved.retain(|(n, _)| *n != name);
                }
                _ => {}
            }
        }
    }
}

fn upsert(resolved: &mut Vec<(String, Vec<IpAddr>)>, name: String, mut addresses: Vec<IpAddr>) {
    // IPv4 first, the switcher session is opened on the first address
    addresses.sort_by_key(|a| !a.is_ipv4());
    match resolved.iter_mut().find(|(n, _)| *n == name) {
        Some(entry) => entry.1 = addresses,
        None => resolved.push((name, addresses)),
    }
}

fn flatten(resolved: &[(String, Vec<IpAddr>)]) -> Vec<IpAddr> {
    resolved
        .iter()
        .flat_map(|(_, addresses)| addresses.iter().copied())
        .collect()
}

impl ServiceDiscovery for MdnsDiscovery {
    fn register_name(&mut self, hostname: &str) -> Result<()> {
        if self.registered.as_deref() == Some(hostname) {
            return Ok(());
        }

        let host = format!("{hostname}.local.");
        let info = ServiceInfo::new(
            ADMIN_SERVICE_TYPE,
            hostname,
            &host,
            "",
            self.admin_port,
            HashMap::<String, String>::new(),
        )
        .context("Failed to build mDNS service info")?
        .enable_addr_auto();

        self.daemon
            .register(info)
            .context("Failed to register mDNS name")?;
        info!("mDNS responder started as {}", host);
        self.registered = Some(hostname.to_string());
        Ok(())
    }

    fn query_service(&mut self, service_type: &str) -> Vec<IpAddr> {
        let browsing = matches!(&self.browse, Some((ty, _)) if ty == service_type);
        if !browsing {
            match self.daemon.browse(service_type) {
                Ok(rx) => {
                    info!("Browsing for {}", service_type);
                    self.browse = Some((service_type.to_string(), rx));
                    self.resolved.clear();
                }
                Err(e) => {
                    debug!("mDNS browse failed: {}", e);
                    return Vec::new();
                }
            }
        }

        self.drain();
        flatten(&self.resolved)
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        let _ = self.daemon.shutdown();
    }
}
