//! Switcher discovery
//!
//! One-shot: once an address is accepted no further queries are made until
//! the endpoint is forgotten.

use std::net::IpAddr;

use tracing::{debug, info, warn};

use crate::context::SwitcherEndpoint;
use crate::hal::ServiceDiscovery;
use crate::interface::InterfaceKind;
use crate::session::SessionManager;

/// Outcome of a discovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// An endpoint was already accepted, no query made
    AlreadyKnown,
    /// The query returned nothing
    Miss,
    /// The first result was the unspecified address
    Rejected(IpAddr),
    Found(IpAddr),
}

pub struct DiscoveryGate {
    discovery: Box<dyn ServiceDiscovery + Send>,
    hostname: String,
    service_type: String,
}

impl DiscoveryGate {
    pub fn new(
        discovery: Box<dyn ServiceDiscovery + Send>,
        hostname: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            discovery,
            hostname: hostname.into(),
            service_type: service_type.into(),
        }
    }

    /// Register the local name, then look for the switcher.
    pub fn network_ready_setup(
        &mut self,
        kind: InterfaceKind,
        endpoint: &mut SwitcherEndpoint,
        session: &mut SessionManager,
    ) -> Discovery {
        match self.discovery.register_name(&self.hostname) {
            Ok(()) => info!("Registered {} on {}", self.hostname, kind),
            Err(e) => warn!("Name registration on {} failed: {:#}", kind, e),
        }
        self.discover_switcher(kind, endpoint, session)
    }

    /// Query once for the switcher service and bind the session to the first
    /// usable result.
    pub fn discover_switcher(
        &mut self,
        kind: InterfaceKind,
        endpoint: &mut SwitcherEndpoint,
        session: &mut SessionManager,
    ) -> Discovery {
        if endpoint.discovered {
            return Discovery::AlreadyKnown;
        }

        let results = self.discovery.query_service(&self.service_type);
        let Some(&address) = results.first() else {
            debug!("No {} found on {}", self.service_type, kind);
            return Discovery::Miss;
        };

        if address.is_unspecified() {
            debug!("Switcher on {} advertised an unspecified address", kind);
            return Discovery::Rejected(address);
        }

        info!(
            "Switcher found at {} on {} ({} candidates)",
            address,
            kind,
            results.len()
        );
        endpoint.accept(address);
        session.bind(address);
        session.connect();
        Discovery::Found(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeDiscovery, FakeSwitcher};
    use crate::session::SessionState;
    use std::net::Ipv4Addr;

    const SERVICE: &str = "_blackmagic._tcp.local.";

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 10, last))
    }

    fn gate(fake: &FakeDiscovery) -> DiscoveryGate {
        DiscoveryGate::new(Box::new(fake.clone()), "onair-setup", SERVICE)
    }

    #[test]
    fn first_result_is_bound_and_connected() {
        let discovery = FakeDiscovery::answering(vec![ip(240), ip(241)]);
        let switcher = FakeSwitcher::default();
        let mut gate = gate(&discovery);
        let mut endpoint = SwitcherEndpoint::default();
        let mut session = SessionManager::new(Box::new(switcher.clone()));

        let outcome = gate.discover_switcher(InterfaceKind::Wired, &mut endpoint, &mut session);

        assert_eq!(outcome, Discovery::Found(ip(240)));
        assert!(endpoint.discovered);
        assert_eq!(endpoint.address, Some(ip(240)));
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(switcher.log.lock().unwrap().bound, Some(ip(240)));
    }

    #[test]
    fn second_call_makes_no_query() {
        let discovery = FakeDiscovery::answering(vec![ip(240)]);
        let mut gate = gate(&discovery);
        let mut endpoint = SwitcherEndpoint::default();
        let mut session = SessionManager::new(Box::new(FakeSwitcher::default()));

        gate.discover_switcher(InterfaceKind::Wired, &mut endpoint, &mut session);
        discovery.set_results(vec![ip(99)]);
        let outcome = gate.discover_switcher(InterfaceKind::Wired, &mut endpoint, &mut session);

        assert_eq!(outcome, Discovery::AlreadyKnown);
        assert_eq!(discovery.queries(), 1);
        assert_eq!(endpoint.address, Some(ip(240)));
    }

    #[test]
    fn empty_result_changes_nothing() {
        let discovery = FakeDiscovery::default();
        let mut gate = gate(&discovery);
        let mut endpoint = SwitcherEndpoint::default();
        let mut session = SessionManager::new(Box::new(FakeSwitcher::default()));

        let outcome = gate.discover_switcher(InterfaceKind::Wireless, &mut endpoint, &mut session);
        assert_eq!(outcome, Discovery::Miss);
        assert_eq!(endpoint, SwitcherEndpoint::default());
        assert_eq!(session.state(), SessionState::Unbound);
    }

    #[test]
    fn unspecified_first_result_is_a_miss() {
        let zero = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let discovery = FakeDiscovery::answering(vec![zero, ip(240)]);
        let mut gate = gate(&discovery);
        let mut endpoint = SwitcherEndpoint::default();
        let mut session = SessionManager::new(Box::new(FakeSwitcher::default()));

        let outcome = gate.discover_switcher(InterfaceKind::Wired, &mut endpoint, &mut session);
        assert_eq!(outcome, Discovery::Rejected(zero));
        assert!(!endpoint.discovered);
        assert_eq!(session.state(), SessionState::Unbound);

        // Retried next time
        discovery.set_results(vec![ip(240)]);
        let outcome = gate.discover_switcher(InterfaceKind::Wired, &mut endpoint, &mut session);
        assert_eq!(outcome, Discovery::Found(ip(240)));
    }

    #[test]
    fn registration_failure_does_not_stop_discovery() {
        let discovery = FakeDiscovery::answering(vec![ip(240)]);
        discovery.log.lock().unwrap().fail_register = true;
        let mut gate = gate(&discovery);
        let mut endpoint = SwitcherEndpoint::default();
        let mut session = SessionManager::new(Box::new(FakeSwitcher::default()));

        let outcome = gate.network_ready_setup(InterfaceKind::Wired, &mut endpoint, &mut session);
        assert_eq!(outcome, Discovery::Found(ip(240)));
        assert_eq!(
            discovery.log.lock().unwrap().registrations,
            vec!["onair-setup".to_string()]
        );
    }
}
