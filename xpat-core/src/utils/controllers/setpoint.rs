//! Operator setpoint for the auto-throttle.
//!
//! Holds the target engine speed on a fixed grid and the loop enable flag.
//! Commands arrive over `SETPOINT_CHANNEL` and are applied on the tick context.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::{Deserialize, Serialize};

use crate::utils::math::stepping::snap_to_grid;

/// Channel used to receive operator commands (`SetpointCommand` messages).
pub static SETPOINT_CHANNEL: embassy_sync::channel::Channel<
    CriticalSectionRawMutex,
    SetpointCommand,
    16,
> = embassy_sync::channel::Channel::new();

/// Setpoint granularity in engine speed units.
pub const TARGET_GRID: u16 = 100;
/// Lowest selectable target.
pub const TARGET_MIN: u16 = 0;
/// Highest selectable target.
pub const TARGET_MAX: u16 = 2500;
/// Target selected at session start.
pub const DEFAULT_TARGET: u16 = 1000;

/// Operator command variants.
///
/// Serialized as JSON with tag `"sc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "sc", rename_all = "snake_case")]
pub enum SetpointCommand {
    /// Select a raw target; snapped to the grid on arrival.
    Set { t: f32 },
    /// One grid step up.
    Up,
    /// One grid step down.
    Down,
    /// Flip the loop enable flag.
    Toggle,
    /// Engage the loop.
    Enable,
    /// Disengage the loop.
    Disable,
}

/// Snapshot of the operator's selection, read once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointState {
    pub target_speed: u16,
    pub enabled: bool,
}

impl Default for SetpointState {
    fn default() -> Self {
        Self {
            target_speed: DEFAULT_TARGET,
            enabled: false,
        }
    }
}

/// Owner of the operator setpoint.
///
/// `target_speed` is always a multiple of `TARGET_GRID` inside
/// `[TARGET_MIN, TARGET_MAX]`.
#[derive(Debug, Default)]
pub struct SetpointStore {
    state: SetpointState,
}

impl SetpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snap `raw` to the grid, clamp it and store it. Never fails.
    pub fn set_target(
        &mut self,
        raw: f32,
    ) {
        let target = snap_to_grid(raw, TARGET_GRID, TARGET_MIN, TARGET_MAX);
        if target != self.state.target_speed {
            tracing::info!(target_speed = target, raw, "target speed changed");
        }
        self.state.target_speed = target;
    }

    /// Move the target one grid step up (`up == true`) or down.
    pub fn step_target(
        &mut self,
        up: bool,
    ) {
        let current = self.state.target_speed as f32;
        let delta = TARGET_GRID as f32;
        self.set_target(if up { current + delta } else { current - delta });
    }

    pub fn toggle_enabled(&mut self) {
        self.set_enabled(!self.state.enabled);
    }

    pub fn set_enabled(
        &mut self,
        enabled: bool,
    ) {
        if enabled != self.state.enabled {
            tracing::info!(
                enabled,
                "auto-throttle {}",
                if enabled { "engaged" } else { "disengaged" }
            );
        }
        self.state.enabled = enabled;
    }

    pub fn get_target(&self) -> u16 {
        self.state.target_speed
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn snapshot(&self) -> SetpointState {
        self.state
    }

    /// Apply one operator command.
    pub fn ex_command(
        &mut self,
        cmd: SetpointCommand,
    ) {
        match cmd {
            SetpointCommand::Set { t } => self.set_target(t),
            SetpointCommand::Up => self.step_target(true),
            SetpointCommand::Down => self.step_target(false),
            SetpointCommand::Toggle => self.toggle_enabled(),
            SetpointCommand::Enable => self.set_enabled(true),
            SetpointCommand::Disable => self.set_enabled(false),
        }
    }
}
