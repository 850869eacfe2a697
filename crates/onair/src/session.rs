//! Switcher session
//!
//! Unbound → Connecting → Connected. Binding and connecting happen together
//! when discovery accepts an address; after that the session is polled once
//! per cycle and never blocks.

use std::net::IpAddr;

use serde::Serialize;
use tracing::{info, warn};

use crate::hal::SwitcherClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unbound,
    Connecting,
    Connected,
}

/// Streaming status reported by the switcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Stopping,
}

pub struct SessionManager {
    client: Box<dyn SwitcherClient + Send>,
    state: SessionState,
    endpoint: Option<IpAddr>,
}

impl SessionManager {
    pub fn new(client: Box<dyn SwitcherClient + Send>) -> Self {
        Self {
            client,
            state: SessionState::Unbound,
            endpoint: None,
        }
    }

    pub fn bind(&mut self, address: IpAddr) {
        info!("Binding switcher session to {}", address);
        self.client.bind(address);
        self.endpoint = Some(address);
    }

    /// Start the handshake. Ignored until an endpoint is bound.
    pub fn connect(&mut self) {
        if self.endpoint.is_none() {
            warn!("Connect requested without a switcher endpoint");
            return;
        }
        self.client.connect();
        self.state = SessionState::Connecting;
    }

    /// Drive the client once and advance the session state.
    pub fn poll(&mut self) {
        if self.state == SessionState::Unbound {
            return;
        }
        self.client.poll();

        let connected = self.client.is_connected();
        match (self.state, connected) {
            (SessionState::Connecting, true) => {
                info!("Switcher session connected");
                self.state = SessionState::Connected;
            }
            (SessionState::Connected, false) => {
                warn!("Switcher session lost, reconnecting");
                self.state = SessionState::Connecting;
            }
            _ => {}
        }
    }

    /// Stream status, or `None` while no session is bound.
    pub fn stream_state(&self) -> Option<StreamState> {
        match self.state {
            SessionState::Unbound => None,
            _ => Some(self.client.stream_state()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn endpoint(&self) -> Option<IpAddr> {
        self.endpoint
    }

    /// Drop the endpoint and return to Unbound.
    pub fn reset(&mut self) {
        if self.state != SessionState::Unbound || self.endpoint.is_some() {
            info!("Switcher session reset");
        }
        self.state = SessionState::Unbound;
        self.endpoint = None;
    }
}
