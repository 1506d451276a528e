//! Runtime configuration.
//!
//! Use [`RuntimeBuilder`](super::builder::RuntimeBuilder) rather than
//! constructing a [`RuntimeConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `ring_entries` | 256 |
//! | `completion_batch` | 64 |
//! | `cleanup_quota` | 1 |
//! | `virtual_time` | false |
//! | `warn_unobserved_failures` | true |

/// Configuration values that drive runtime behavior.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "config-file", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct RuntimeConfig {
    /// Submission queue depth requested from the ring backend.
    pub ring_entries: u32,
    /// Capacity hint for the completion drain scratch buffer.
    pub completion_batch: usize,
    /// Suspensions an unwinding task may still perform after cancellation
    /// is injected. Beyond the quota, suspension attempts fail immediately.
    pub cleanup_quota: u32,
    /// Run on virtual time: the loop never sleeps, it jumps the clock to
    /// the next deadline. Intended for the lab ring.
    pub virtual_time: bool,
    /// Log a warning when a task fails and nothing will ever observe the
    /// failure (no join handle, no group).
    pub warn_unobserved_failures: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ring_entries: 256,
            completion_batch: 64,
            cleanup_quota: 1,
            virtual_time: false,
            warn_unobserved_failures: true,
        }
    }
}

impl RuntimeConfig {
    /// Clamps nonsensical values to safe ones.
    pub fn normalize(&mut self) {
        if self.ring_entries == 0 {
            self.ring_entries = 1;
        }
        if self.completion_batch == 0 {
            self.completion_batch = 1;
        }
    }
}
