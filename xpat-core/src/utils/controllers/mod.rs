//! Module Exports
//!
//! This file exports the pieces of the auto-throttle loop.
//!
//! - `setpoint`: operator target and enable flag, plus the command channel.
//! - `signals`: traits the host implements to expose speed and throttle.
//! - `throttle`: the closed-loop controller and its tuning.

pub mod setpoint;
pub mod signals;
pub mod throttle;

pub use setpoint::{SetpointCommand, SetpointState, SetpointStore, SETPOINT_CHANNEL};
pub use signals::{ActuatorSink, SignalId, SignalSource};
pub use throttle::{ConfigError, Phase, ThrottleConfig, ThrottleController, TickReport};

use embassy_time::Duration;

/// Ties the setpoint, controller and data layer together for one engine.
///
/// The host calls `run_tick` from its periodic callback; operator commands
/// queued on `SETPOINT_CHANNEL` are applied first, so both arrive on the same
/// execution context.
pub struct SystemController<S, A> {
    pub setpoint: SetpointStore,
    pub throttle: ThrottleController,
    source: S,
    actuator: A,
}

impl<S, A> SystemController<S, A>
where
    S: SignalSource,
    A: ActuatorSink,
{
    pub fn new(
        config: ThrottleConfig,
        source: S,
        actuator: A,
    ) -> Result<Self, ConfigError> {
        Ok(SystemController {
            setpoint: SetpointStore::new(),
            throttle: ThrottleController::try_new(config)?,
            source,
            actuator,
        })
    }

    /// Drain pending operator commands. Returns how many were applied.
    pub fn pump_commands(&mut self) -> usize {
        let rx = SETPOINT_CHANNEL.receiver();
        let mut applied = 0;
        while let Ok(cmd) = rx.try_receive() {
            tracing::debug!(?cmd, "operator command");
            self.setpoint.ex_command(cmd);
            applied += 1;
        }
        applied
    }

    /// Read both signals, run the controller and forward any write.
    pub fn run_tick(
        &mut self,
        dt: Duration,
    ) -> TickReport {
        self.pump_commands();
        self.step(dt)
    }

    /// One controller iteration without touching the command channel.
    pub fn step(
        &mut self,
        dt: Duration,
    ) -> TickReport {
        let snapshot = self.setpoint.snapshot();
        let measured = self.source.read_scalar(SignalId::EngineSpeed);
        let position = self.actuator.read_scalar(SignalId::ThrottlePosition);
        let report = self.throttle.tick(dt, &snapshot, measured, position);

        if let Some(value) = report.write {
            if let Err(e) = self
                .actuator
                .write_scalar(SignalId::ThrottlePosition, value)
            {
                tracing::warn!("throttle write failed: {:?}", e);
            }
        }
        report
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
