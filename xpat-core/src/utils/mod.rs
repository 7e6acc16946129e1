//! Utility re-exports and helper macros for the auto-throttle.
//!
//! - `controllers`: setpoint store, data-access traits and the throttle loop
//! - `math`: grid snapping and step sizing
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod controllers;
pub mod math;

pub use controllers::SystemController;
pub use embassy_time::Duration;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::__private::StaticCell<$t> =
            $crate::__private::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
