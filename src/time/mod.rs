//! Time primitives.

pub mod sleep;

pub use crate::runtime::now;
pub use sleep::{sleep, sleep_until, Sleep};
