//! Engine-speed auto-throttle core for flight simulator plugins on no-std targets.
//!
//! The host owns the window, widgets and plugin callbacks; this crate only
//! holds the operator setpoint and decides when and how far to nudge the
//! throttle. See `xpat-app/mock-host` for a runnable harness.
#![no_std]

pub mod utils;

#[doc(hidden)]
pub mod __private {
    pub use static_cell::StaticCell;
}
