//! Runtime machinery.
//!
//! - [`config`] / [`env_config`] / [`builder`]: configuration and entry
//! - [`state`]: runtime state and the scheduler loop
//! - [`scheduler`]: two-lane FIFO run queue
//! - [`timer`]: deadline heap
//! - [`multiplexer`]: completion-token map and drain routine
//! - [`stored_task`] / [`task_table`]: type-erased future storage
//! - [`task_handle`]: `spawn` and `JoinHandle`
//! - [`io_op`]: awaitable ring operations
//! - [`waker`]: waker with FIFO deduplication
//! - [`yield_now`]: voluntary yield point
//! - [`local`]: thread-local runtime access for leaf futures

pub mod builder;
pub mod config;
pub mod env_config;
pub mod io_op;
pub(crate) mod local;
pub mod multiplexer;
pub mod scheduler;
pub mod state;
pub mod stored_task;
pub mod task_handle;
pub mod task_table;
pub mod timer;
pub mod waker;
pub mod yield_now;

pub use builder::{BuildError, Runtime, RuntimeBuilder};
pub use config::RuntimeConfig;
pub use io_op::{submit, OpFuture, OpOutput};
pub use multiplexer::CompletionMap;
pub use scheduler::RunQueue;
pub use state::{Clock, RuntimeState};
pub use stored_task::StoredTask;
pub use task_handle::{spawn, JoinHandle};
pub use task_table::TaskTable;
pub use timer::{TimerHeap, TimerTarget};
pub use waker::WakerState;
pub use yield_now::{yield_now, YieldNow};

use crate::types::Time;

/// Returns the current runtime time.
///
/// # Panics
///
/// Panics outside a running runtime.
#[must_use]
pub fn now() -> Time {
    local::with_state(|state| state.now()).expect("now() requires a running runtime")
}
