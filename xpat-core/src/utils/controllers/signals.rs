//! Data-access seams between the controller and the simulator.
//!
//! The host binds each `SignalId` to whatever its data layer exposes. Reads
//! return `None` when the underlying value cannot be resolved.

/// Scalar channels the auto-throttle reads or commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalId {
    /// Measured engine speed, in the same units as the setpoint.
    EngineSpeed,
    /// Commanded throttle position, `0.0..=1.0`.
    ThrottlePosition,
}

impl SignalId {
    /// Simulator data path the channel is normally bound to.
    pub fn data_path(&self) -> &'static str {
        match self {
            SignalId::EngineSpeed => "sim/cockpit2/engine/indicators/engine_speed_rpm",
            SignalId::ThrottlePosition => "sim/cockpit2/engine/actuators/throttle_ratio_all",
        }
    }
}

/// Read side of the data layer.
pub trait SignalSource {
    fn read_scalar(
        &mut self,
        id: SignalId,
    ) -> Option<f32>;
}

/// Commandable side of the data layer.
pub trait ActuatorSink: SignalSource {
    type Error: core::fmt::Debug;

    fn write_scalar(
        &mut self,
        id: SignalId,
        value: f32,
    ) -> Result<(), Self::Error>;
}
