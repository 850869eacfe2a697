//! Tally light
//!
//! Maps network readiness and switcher stream state to the light:
//!
//! | network  | stream               | light    |
//! |----------|----------------------|----------|
//! | no addr  | any                  | off      |
//! | ready    | streaming            | steady   |
//! | ready    | connecting, stopping | blinking |
//! | ready    | idle / no session    | off      |
//!
//! Blinking toggles the output once per period, measured from the last
//! toggle. Entering the blinking state does not force a toggle.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::context::ConnectivityContext;
use crate::hal::OutputPin;
use crate::session::StreamState;

/// Output pin level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    High,
    #[default]
    Low,
}

impl Level {
    pub fn from_bool(on: bool) -> Self {
        if on {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// What the light should be doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightState {
    #[default]
    Off,
    SteadyOn,
    Blinking,
}

/// Derive the light state. `stream` is `None` when no session is bound.
pub fn light_state(network_ready: bool, stream: Option<StreamState>) -> LightState {
    if !network_ready {
        return LightState::Off;
    }
    match stream {
        Some(StreamState::Streaming) => LightState::SteadyOn,
        Some(StreamState::Connecting) | Some(StreamState::Stopping) => LightState::Blinking,
        Some(StreamState::Idle) | None => LightState::Off,
    }
}

/// Blink phase and the instant of the last toggle.
#[derive(Debug, Clone, Copy)]
pub struct BlinkTimer {
    period: Duration,
    last_toggle: Instant,
    phase: bool,
}

impl BlinkTimer {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            last_toggle: now,
            phase: false,
        }
    }

    /// Toggle the phase if a full period has elapsed since the last toggle.
    /// Returns true when a toggle happened.
    pub fn tick(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_toggle) < self.period {
            return false;
        }
        self.phase = !self.phase;
        self.last_toggle = now;
        true
    }

    pub fn phase(&self) -> bool {
        self.phase
    }

    pub fn last_toggle(&self) -> Instant {
        self.last_toggle
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Drives the light output once per control cycle.
pub struct TallyDriver {
    pin: Box<dyn OutputPin + Send>,
}

impl TallyDriver {
    pub fn new(pin: Box<dyn OutputPin + Send>) -> Self {
        Self { pin }
    }

    /// Compute the level for this cycle and write it to the pin.
    pub fn apply(
        &mut self,
        ctx: &mut ConnectivityContext,
        stream: Option<StreamState>,
        now: Instant,
    ) -> Level {
        let light = light_state(ctx.interfaces.has_address(), stream);
        let level = match light {
            LightState::Off => Level::Low,
            LightState::SteadyOn => Level::High,
            LightState::Blinking => {
                ctx.blink.tick(now);
                Level::from_bool(ctx.blink.phase())
            }
        };

        if light != ctx.light {
            debug!(
                "Light {:?} -> {:?} (blink period {:?})",
                ctx.light,
                light,
                ctx.blink.period()
            );
        }
        ctx.light = light;
        ctx.level = level;
        self.pin.set_level(level);
        level
    }
}
