//! Control cycle
//!
//! Owns the connectivity context and every collaborator. The platform loop
//! feeds queued events through [`Controller::handle_event`], then calls
//! [`Controller::cycle`] once per period.

use std::net::IpAddr;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::arbiter;
use crate::config::CoreConfig;
use crate::context::ConnectivityContext;
use crate::discovery::{Discovery, DiscoveryGate};
use crate::event::NetworkEvent;
use crate::hal::{ImageWriter, NetworkDriver, OutputPin, Restart, ServiceDiscovery, SwitcherClient};
use crate::interface::{InterfaceKind, InterfaceState};
use crate::session::{SessionManager, SessionState, StreamState};
use crate::tally::{Level, LightState, TallyDriver};
use crate::update::{UpdateError, UpdateGate, UpdatePhase, UpdateReport, UpdateRequest};

/// Platform implementations handed to the controller.
pub struct Collaborators {
    pub network: Box<dyn NetworkDriver + Send>,
    pub discovery: Box<dyn ServiceDiscovery + Send>,
    pub switcher: Box<dyn SwitcherClient + Send>,
    pub light: Box<dyn OutputPin + Send>,
    pub image: Box<dyn ImageWriter + Send>,
    pub restart: Box<dyn Restart + Send>,
}

/// Point-in-time view of the device for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub hostname: String,
    pub status_bits: u16,
    pub wired: InterfaceState,
    pub wireless: InterfaceState,
    pub hotspot: bool,
    pub active: Option<InterfaceKind>,
    pub switcher: Option<IpAddr>,
    pub session: SessionState,
    pub stream: Option<StreamState>,
    pub light: LightState,
    pub level: Level,
    pub update: UpdatePhase,
}

pub struct Controller {
    hostname: String,
    ctx: ConnectivityContext,
    network: Box<dyn NetworkDriver + Send>,
    discovery: DiscoveryGate,
    session: SessionManager,
    tally: TallyDriver,
    update: Option<UpdateGate>,
}

impl Controller {
    pub fn new(config: &CoreConfig, parts: Collaborators, now: Instant) -> Self {
        let update = config
            .update_surface
            .then(|| UpdateGate::new(parts.image, parts.restart));

        Self {
            hostname: config.hostname.clone(),
            ctx: ConnectivityContext::new(config.blink_period, now),
            network: parts.network,
            discovery: DiscoveryGate::new(
                parts.discovery,
                config.hostname.clone(),
                config.service_type.clone(),
            ),
            session: SessionManager::new(parts.switcher),
            tally: TallyDriver::new(parts.light),
            update,
        }
    }

    /// Dispatch one lifecycle event. Returns the discovery outcome when the
    /// event made an interface ready.
    pub fn handle_event(&mut self, event: &NetworkEvent) -> Option<Discovery> {
        let ready = arbiter::dispatch(event, &mut self.ctx, self.network.as_mut(), &self.hostname);

        let outcome = ready.map(|kind| {
            self.discovery
                .network_ready_setup(kind, &mut self.ctx.endpoint, &mut self.session)
        });

        if !self.ctx.interfaces.has_address()
            && (self.ctx.endpoint.discovered || self.session.state() != SessionState::Unbound)
        {
            info!("All interfaces lost their address, forgetting switcher");
            self.ctx.endpoint.forget();
            self.session.reset();
        }

        outcome
    }

    /// One pass of the control loop: discover or poll, then drive the light.
    pub fn cycle(&mut self, now: Instant) -> Level {
        if let Some(kind) = self.ctx.interfaces.active() {
            if self.ctx.endpoint.discovered {
                self.session.poll();
            } else {
                self.discovery
                    .discover_switcher(kind, &mut self.ctx.endpoint, &mut self.session);
            }
        }

        let stream = self.session.stream_state();
        self.tally.apply(&mut self.ctx, stream, now)
    }

    pub fn handle_update(&mut self, request: UpdateRequest) -> Result<UpdateReport, UpdateError> {
        match self.update.as_mut() {
            Some(gate) => gate.handle(request),
            None => Err(UpdateError::Disabled),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let interfaces = &self.ctx.interfaces;
        StatusSnapshot {
            hostname: self.hostname.clone(),
            status_bits: interfaces.bits().0,
            wired: interfaces.state(InterfaceKind::Wired).clone(),
            wireless: interfaces.state(InterfaceKind::Wireless).clone(),
            hotspot: interfaces.is_hotspot_up(),
            active: interfaces.active(),
            switcher: self.ctx.endpoint.address,
            session: self.session.state(),
            stream: self.session.stream_state(),
            light: self.ctx.light,
            level: self.ctx.level,
            update: self
                .update
                .as_ref()
                .map(UpdateGate::phase)
                .unwrap_or_default(),
        }
    }

    pub fn context(&self) -> &ConnectivityContext {
        &self.ctx
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }
}
