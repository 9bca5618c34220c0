//! Stream combinators for frame previews

pub mod throttle;

pub use throttle::{Throttle, ThrottleExt};
