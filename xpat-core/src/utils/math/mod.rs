//! Math utilities for the auto-throttle.
//!
//! This module provides grid snapping for the operator setpoint and the
//! exponential step schedule used when nudging the throttle.

pub mod stepping;
