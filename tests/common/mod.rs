//! Shared helpers for integration tests.
#![allow(dead_code)]

use ringloop::ring::{LabHandle, LabRing};
use ringloop::{Runtime, RuntimeBuilder};
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initializes trace logging once per test binary.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// Lab runtime with an auto-mode ring and virtual time.
pub fn lab() -> (Runtime, LabHandle) {
    init_logging();
    Runtime::lab()
}

/// Lab runtime with a manual-mode ring, for completion reordering.
pub fn lab_manual() -> (Runtime, LabHandle) {
    init_logging();
    let (ring, handle) = LabRing::manual();
    let rt = RuntimeBuilder::new()
        .virtual_time(true)
        .ring(Box::new(ring))
        .build()
        .expect("lab runtime builds");
    (rt, handle)
}
