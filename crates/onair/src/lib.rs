//! onair - network tally light core
//!
//! The connectivity and signalling state machine behind the tally light:
//!
//! - **Interfaces**: status tracker and arbiter that keep exactly one of the
//!   wired and wireless paths active
//! - **Discovery**: service-discovery gate that finds the switcher once the
//!   device has an address
//! - **Session**: the switcher session (Unbound → Connecting → Connected)
//! - **Tally**: light state derivation with the 200 ms blink
//! - **Update**: chunked firmware upload pass-through
//!
//! Hardware and network stacks are reached through the traits in [`hal`].
//! Everything runs on one thread: events are queued by the platform and
//! handed to [`Controller::handle_event`] before each [`Controller::cycle`].

mod arbiter;
mod config;
mod context;
mod controller;
mod discovery;
mod event;
pub mod hal;
mod interface;
mod session;
mod tally;
mod update;

#[cfg(test)]
mod fakes;

pub use arbiter::dispatch;
pub use config::*;
pub use context::{ConnectivityContext, SwitcherEndpoint};
pub use controller::{Collaborators, Controller, StatusSnapshot};
pub use discovery::{Discovery, DiscoveryGate};
pub use event::{Addressing, NetworkEvent};
pub use interface::{InterfaceKind, InterfaceState, InterfaceTracker, StatusBits};
pub use session::{SessionManager, SessionState, StreamState};
pub use tally::{light_state, BlinkTimer, Level, LightState, TallyDriver};
pub use update::{UpdateError, UpdateGate, UpdatePhase, UpdateReport, UpdateRequest};
