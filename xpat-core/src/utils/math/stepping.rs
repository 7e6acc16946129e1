//! Quantization and step-size helpers.
//!
//! `snap_to_grid` turns a raw operator value into a setpoint on a fixed grid,
//! `adjustment_step` computes how far the throttle moves for a given speed
//! error, and `nudge` applies that step inside the actuator's travel.
//!
//! # Example
//! ```rust
//! use xpat_core::utils::math::stepping::{adjustment_step, nudge, snap_to_grid};
//! assert_eq!(snap_to_grid(1149.0, 100, 0, 2500), 1100);
//! let step = adjustment_step(250.0, 100.0, 0.001, 0.1);
//! assert!((step - 0.004).abs() < 1e-7);
//! assert_eq!(nudge(0.98, 0.05, true), 1.0);
//! ```
use libm;

/// Largest doubling exponent evaluated; anything past it saturates anyway.
const MAX_DOUBLINGS: f32 = 64.0;

/// Snap `raw` to the nearest multiple of `grid` and clamp it to `[min, max]`.
///
/// Halfway values round away from zero. Non-finite input maps to `min` for
/// NaN and to the matching bound for infinities.
pub fn snap_to_grid(
    raw: f32,
    grid: u16,
    min: u16,
    max: u16,
) -> u16 {
    if raw.is_nan() || grid == 0 {
        return min;
    }
    let g = grid as f32;
    let snapped = libm::roundf(raw / g) * g;
    snapped.clamp(min as f32, max as f32) as u16
}

/// Step size for a speed error of magnitude `abs_error`.
///
/// Starts at `base` and doubles once per full `doubling_span` of error, then
/// saturates at `max`: `min(base * 2^floor(abs_error / doubling_span), max)`.
pub fn adjustment_step(
    abs_error: f32,
    doubling_span: f32,
    base: f32,
    max: f32,
) -> f32 {
    let doublings = libm::floorf(abs_error.abs() / doubling_span);
    if !doublings.is_finite() || doublings >= MAX_DOUBLINGS {
        return max;
    }
    (base * libm::exp2f(doublings)).min(max)
}

/// Move `position` by `step` in the given direction, keeping it inside `[0, 1]`.
pub fn nudge(
    position: f32,
    step: f32,
    increase: bool,
) -> f32 {
    let next = if increase {
        position + step
    } else {
        position - step
    };
    next.clamp(0.0, 1.0)
}
