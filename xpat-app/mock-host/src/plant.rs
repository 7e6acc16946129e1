//! Simulated engine for exercising the auto-throttle off the simulator.
//!
//! Engine speed lags toward `idle + throttle * (max - idle)` with a first
//! order time constant. `SpeedProbe` and `ThrottleLever` share one plant the
//! way bus devices share a `RefCell` bus.

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_time::Duration;
use xpat_core::utils::controllers::{ActuatorSink, SignalId, SignalSource};

pub const IDLE_SPEED: f32 = 600.0;
pub const MAX_SPEED: f32 = 2700.0;
pub const TIME_CONSTANT_S: f32 = 1.5;

pub struct EnginePlant {
    speed: f32,
    throttle: f32,
    /// Drop every n-th speed read; 0 disables dropouts.
    dropout_every: u32,
    reads: u32,
}

impl EnginePlant {
    pub fn new(
        throttle: f32,
        dropout_every: u32,
    ) -> Self {
        let throttle = throttle.clamp(0.0, 1.0);
        EnginePlant {
            speed: Self::equilibrium(throttle),
            throttle,
            dropout_every,
            reads: 0,
        }
    }

    fn equilibrium(throttle: f32) -> f32 {
        IDLE_SPEED + throttle * (MAX_SPEED - IDLE_SPEED)
    }

    pub fn advance(
        &mut self,
        dt: Duration,
    ) {
        let secs = dt.as_micros() as f32 / 1_000_000.0;
        let alpha = (secs / TIME_CONSTANT_S).min(1.0);
        self.speed += (Self::equilibrium(self.throttle) - self.speed) * alpha;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn throttle(&self) -> f32 {
        self.throttle
    }

    fn read_speed(&mut self) -> Option<f32> {
        self.reads = self.reads.wrapping_add(1);
        if self.dropout_every != 0 && self.reads % self.dropout_every == 0 {
            return None;
        }
        Some(self.speed)
    }
}

pub struct SpeedProbe<'a>(pub &'a RefCell<EnginePlant>);

impl SignalSource for SpeedProbe<'_> {
    fn read_scalar(
        &mut self,
        id: SignalId,
    ) -> Option<f32> {
        match id {
            SignalId::EngineSpeed => self.0.borrow_mut().read_speed(),
            SignalId::ThrottlePosition => None,
        }
    }
}

pub struct ThrottleLever<'a>(pub &'a RefCell<EnginePlant>);

impl SignalSource for ThrottleLever<'_> {
    fn read_scalar(
        &mut self,
        id: SignalId,
    ) -> Option<f32> {
        match id {
            SignalId::ThrottlePosition => Some(self.0.borrow().throttle),
            SignalId::EngineSpeed => None,
        }
    }
}

impl ActuatorSink for ThrottleLever<'_> {
    type Error = Infallible;

    fn write_scalar(
        &mut self,
        id: SignalId,
        value: f32,
    ) -> Result<(), Self::Error> {
        if id == SignalId::ThrottlePosition {
            self.0.borrow_mut().throttle = value.clamp(0.0, 1.0);
        }
        Ok(())
    }
}
