//! Tracing compatibility layer for structured logging.
//!
//! With the `tracing-integration` feature (enabled by default) the macros
//! re-export the `tracing` crate. Without it they compile to nothing, so
//! the runtime carries no logging cost in stripped-down builds.
//!
//! ```rust,ignore
//! use ringloop::tracing_compat::{debug, trace, warn};
//!
//! debug!(task = %id, "task spawned");
//! warn!(task = %id, "task failed but nothing joined it");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op macros when tracing is disabled.

    /// No-op trace-level logging macro.
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub(crate) use noop::{debug, error, info, trace, warn};
