//! Shared helpers for unit and integration tests.
//!
//! ```rust,ignore
//! use ringloop::test_utils::{init_test_logging, run_lab};
//!
//! init_test_logging();
//! let value = run_lab(|_handle| async { Ok(21 * 2) }).unwrap();
//! assert_eq!(value, 42);
//! ```

use crate::error::Result;
use crate::ring::{LabHandle, LabRing};
use crate::runtime::{Runtime, RuntimeBuilder};
use std::future::Future;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initializes trace-level test logging. Safe to call repeatedly; the
/// first call wins.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        #[cfg(feature = "tracing-integration")]
        {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_test_writer()
                .with_target(true)
                .with_ansi(false)
                .try_init();
        }
    });
}

/// Builds a lab runtime (auto ring, virtual time) and blocks on the
/// future produced by `body`, which receives the lab handle.
///
/// # Errors
///
/// Whatever the body returns.
pub fn run_lab<T, F, Fut>(body: F) -> Result<T>
where
    T: 'static,
    F: FnOnce(LabHandle) -> Fut,
    Fut: Future<Output = Result<T>> + 'static,
{
    init_test_logging();
    let (rt, handle) = Runtime::lab();
    rt.block_on(body(handle))
}

/// Like [`run_lab`] but with a manual-mode ring, for completion
/// reordering scenarios.
///
/// # Errors
///
/// Whatever the body returns.
pub fn run_lab_manual<T, F, Fut>(body: F) -> Result<T>
where
    T: 'static,
    F: FnOnce(LabHandle) -> Fut,
    Fut: Future<Output = Result<T>> + 'static,
{
    init_test_logging();
    let (ring, handle) = LabRing::manual();
    let rt = RuntimeBuilder::new()
        .virtual_time(true)
        .ring(Box::new(ring))
        .build()
        .expect("lab runtime build is infallible");
    rt.block_on(body(handle))
}
