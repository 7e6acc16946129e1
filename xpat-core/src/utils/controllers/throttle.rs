//! Closed-loop throttle controller.
//!
//! Holds engine speed near the operator target by nudging the throttle in
//! small steps. A deviation must persist for the settle time before the first
//! correction, corrections are rate limited, and the step grows with the size
//! of the error up to a ceiling.
//!
//! ```text
//! IN_TOLERANCE --(|error| > tolerance)--> PENDING(t0)
//! PENDING --(settled && rate gate open)--> ADJUSTING
//! ADJUSTING --(still out of band)--> ADJUSTING
//! any --(|error| <= tolerance | disabled)--> IN_TOLERANCE
//! ```

use core::fmt;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use super::setpoint::SetpointState;
use crate::utils::math::stepping::{adjustment_step, nudge};

/// Half-width of the band around the target where nothing is done.
pub const TOLERANCE: f32 = 15.0;
/// Smallest throttle step, applied for errors under one doubling span.
pub const BASE_STEP: f32 = 0.001;
/// Base step of the coarse profile, five times the canonical one.
pub const COARSE_BASE_STEP: f32 = 0.005;
/// Ceiling on a single throttle step.
pub const MAX_STEP: f32 = 0.1;
/// Error magnitude that doubles the step.
pub const DOUBLING_SPAN: f32 = 100.0;
/// How long a deviation must persist before acting.
pub const SETTLE_TIME: Duration = Duration::from_millis(2_000);
/// Minimum spacing between two throttle writes.
pub const MIN_ADJUST_INTERVAL: Duration = Duration::from_millis(1_000);
/// Longest settle time or adjust interval a config may ask for (one hour).
pub const MAX_INTERVAL_MS: u64 = 3_600_000;

/// Errors reported when validating a `ThrottleConfig`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    ToleranceInvalid(f32),
    BaseStepInvalid(f32),
    MaxStepInvalid(f32),
    BaseStepAboveMax { base_step: f32, max_step: f32 },
    IntervalTooLong { field: &'static str, ms: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConfigError::ToleranceInvalid(v) => {
                write!(f, "tolerance must be finite and non-negative, got {}", v)
            }
            ConfigError::BaseStepInvalid(v) => {
                write!(f, "base step must be finite and positive, got {}", v)
            }
            ConfigError::MaxStepInvalid(v) => write!(f, "max step must be in (0, 1], got {}", v),
            ConfigError::BaseStepAboveMax {
                base_step,
                max_step,
            } => write!(f, "base step {} exceeds max step {}", base_step, max_step),
            ConfigError::IntervalTooLong { field, ms } => {
                write!(f, "{} of {} ms exceeds {} ms", field, ms, MAX_INTERVAL_MS)
            }
        }
    }
}

/// Tuning for the throttle loop.
///
/// Times are carried in milliseconds so the struct can be loaded from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub tolerance: f32,
    pub base_step: f32,
    pub max_step: f32,
    pub settle_time_ms: u64,
    pub min_adjust_interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            tolerance: TOLERANCE,
            base_step: BASE_STEP,
            max_step: MAX_STEP,
            settle_time_ms: SETTLE_TIME.as_millis(),
            min_adjust_interval_ms: MIN_ADJUST_INTERVAL.as_millis(),
        }
    }
}

impl ThrottleConfig {
    /// Same loop with a 5x larger base step. Converges faster on small errors
    /// but hunts more around the target.
    pub fn coarse() -> Self {
        Self {
            base_step: COARSE_BASE_STEP,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::ToleranceInvalid(self.tolerance));
        }
        if !self.base_step.is_finite() || self.base_step <= 0.0 {
            return Err(ConfigError::BaseStepInvalid(self.base_step));
        }
        if !(self.max_step > 0.0 && self.max_step <= 1.0) {
            return Err(ConfigError::MaxStepInvalid(self.max_step));
        }
        if self.base_step > self.max_step {
            return Err(ConfigError::BaseStepAboveMax {
                base_step: self.base_step,
                max_step: self.max_step,
            });
        }
        if self.settle_time_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::IntervalTooLong {
                field: "settle_time_ms",
                ms: self.settle_time_ms,
            });
        }
        if self.min_adjust_interval_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::IntervalTooLong {
                field: "min_adjust_interval_ms",
                ms: self.min_adjust_interval_ms,
            });
        }
        Ok(())
    }

    /// Settle time, capped at `MAX_INTERVAL_MS` for unvalidated configs.
    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms.min(MAX_INTERVAL_MS))
    }

    /// Adjust interval, capped at `MAX_INTERVAL_MS` for unvalidated configs.
    pub fn min_adjust_interval(&self) -> Duration {
        Duration::from_millis(self.min_adjust_interval_ms.min(MAX_INTERVAL_MS))
    }
}

/// Where the loop ended up on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Loop disengaged by the operator.
    Disabled,
    /// Speed or throttle reading missing; tick skipped.
    SignalUnavailable,
    /// Speed inside the tolerance band.
    InTolerance,
    /// Out of band, waiting for the deviation to persist.
    Settling,
    /// Out of band and settled, but the last write was too recent.
    RateLimited,
    /// A throttle write was issued.
    Adjusting,
    /// Throttle already at its stop in the needed direction.
    Saturated,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Disabled => "OFF",
            Phase::SignalUnavailable => "---",
            Phase::InTolerance => "HOLD",
            Phase::Settling => "WAIT",
            Phase::RateLimited => "WAIT",
            Phase::Adjusting => "ADJ",
            Phase::Saturated => "LIM",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub phase: Phase,
    /// `target - measured`, when both were known this tick.
    pub error: Option<f32>,
    /// Throttle position to write, if any.
    pub write: Option<f32>,
}

impl TickReport {
    fn idle(
        phase: Phase,
        error: Option<f32>,
    ) -> Self {
        Self {
            phase,
            error,
            write: None,
        }
    }
}

impl fmt::Display for TickReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.error {
            Some(e) => write!(f, "{} err {:+.0}", self.phase, e)?,
            None => write!(f, "{} err ---", self.phase)?,
        }
        if let Some(w) = self.write {
            write!(f, " -> {:.3}", w)?;
        }
        Ok(())
    }
}

/// Timing state owned by the controller. All times are measured from activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState {
    pub total_elapsed: Duration,
    /// `None` until the first write, so the rate gate starts open.
    pub last_adjust: Option<Duration>,
    /// Start of the current out-of-tolerance episode; `None` while in band.
    pub out_of_tolerance_since: Option<Duration>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            total_elapsed: Duration::from_ticks(0),
            last_adjust: None,
            out_of_tolerance_since: None,
        }
    }
}

impl ControllerState {
    fn invariants_hold(&self) -> bool {
        let since_ok = self
            .out_of_tolerance_since
            .map_or(true, |t| t <= self.total_elapsed);
        let adjust_ok = self.last_adjust.map_or(true, |t| t <= self.total_elapsed);
        since_ok && adjust_ok
    }
}

/// Single-input, single-output engine speed controller.
#[derive(Debug, Clone)]
pub struct ThrottleController {
    config: ThrottleConfig,
    settle_time: Duration,
    min_adjust_interval: Duration,
    state: ControllerState,
}

impl Default for ThrottleController {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl ThrottleController {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            settle_time: config.settle_time(),
            min_adjust_interval: config.min_adjust_interval(),
            state: ControllerState::default(),
        }
    }

    /// Build a controller after checking the tuning values.
    pub fn try_new(config: ThrottleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Run one loop iteration.
    ///
    /// `measured_speed` and `throttle` are `None` when the data source could
    /// not provide them; non-finite readings are treated the same way. A
    /// missing signal skips the tick but keeps the out-of-tolerance clock, so
    /// a single dropout does not restart the settle time. Disabling the loop
    /// does restart it.
    pub fn tick(
        &mut self,
        dt: Duration,
        setpoint: &SetpointState,
        measured_speed: Option<f32>,
        throttle: Option<f32>,
    ) -> TickReport {
        self.state.total_elapsed += dt;
        let now = self.state.total_elapsed;
        debug_assert!(self.state.invariants_hold());

        if !setpoint.enabled {
            self.state.out_of_tolerance_since = None;
            return TickReport::idle(Phase::Disabled, None);
        }

        let (measured, position) = match (
            measured_speed.filter(|v| v.is_finite()),
            throttle.filter(|v| v.is_finite()),
        ) {
            (Some(m), Some(p)) => (m, p),
            _ => {
                tracing::trace!("signal unavailable, skipping tick");
                return TickReport::idle(Phase::SignalUnavailable, None);
            }
        };

        let error = setpoint.target_speed as f32 - measured;
        if error.abs() <= self.config.tolerance {
            self.state.out_of_tolerance_since = None;
            return TickReport::idle(Phase::InTolerance, Some(error));
        }

        let since = *self.state.out_of_tolerance_since.get_or_insert(now);
        if now - since < self.settle_time {
            tracing::trace!(error, "out of tolerance, settling");
            return TickReport::idle(Phase::Settling, Some(error));
        }
        if let Some(last) = self.state.last_adjust {
            if now - last < self.min_adjust_interval {
                return TickReport::idle(Phase::RateLimited, Some(error));
            }
        }

        let step = adjustment_step(
            error,
            DOUBLING_SPAN,
            self.config.base_step,
            self.config.max_step,
        );
        let next = nudge(position, step, error > 0.0);

        if next == position {
            tracing::trace!(position, "throttle saturated");
            return TickReport::idle(Phase::Saturated, Some(error));
        }

        self.state.last_adjust = Some(now);
        tracing::debug!(error, step, from = position, to = next, "throttle adjust");
        TickReport {
            phase: Phase::Adjusting,
            error: Some(error),
            write: Some(next),
        }
    }
}
