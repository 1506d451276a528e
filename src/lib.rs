//! Ringloop: a completion-driven, single-threaded async runtime.
//!
//! # Overview
//!
//! Ringloop turns a kernel completion queue (submit an operation, later
//! reap a notification that it finished) into a cooperative scheduler for
//! Rust futures, with structured-concurrency grouping and scoped
//! cancellation. It is built for programs that multiplex many concurrent
//! I/O operations through one submission/completion channel without
//! spawning OS threads.
//!
//! # Core Guarantees
//!
//! - **Exactly-once resolution**: every pending result settles once;
//!   double settlement is a reported programming error, never silent.
//! - **Deterministic wakeup order**: completions drained in a pass settle
//!   before any task resumes; tasks resume FIFO in the order they became
//!   ready; continuations fire in registration order.
//! - **Cancel-correct unwinding**: cancellation is injected at suspension
//!   points as a typed error, cleanup code runs, and a bounded suspension
//!   allowance keeps unwinding from stalling the runtime.
//! - **First-failure groups**: a task group records its first member
//!   failure and cancels the siblings; `exit` joins every member before
//!   reporting.
//! - **Deterministic testing**: the lab ring plus virtual time make
//!   scheduling and completion reordering fully scriptable.
//!
//! # Module Structure
//!
//! - [`promise`]: single-assignment result cells (the suspension unit)
//! - [`ring`]: submission/completion boundary and its backends
//! - [`runtime`]: scheduler loop, task table, timers, multiplexer
//! - [`scope`]: cancellation scopes, `move_on_after` / `fail_after`
//! - [`group`]: task groups with first-failure propagation
//! - [`time`]: sleep futures
//! - [`sync`]: task-level Event / Semaphore / Lock
//! - [`fs`] / [`net`]: file and socket operations over the ring
//! - [`error`]: error taxonomy
//! - [`types`]: identifiers, timestamps, cancellation reasons, outcomes

#![cfg_attr(not(feature = "io-uring"), forbid(unsafe_code))]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod fs;
pub mod group;
pub mod net;
pub mod promise;
pub mod record;
pub mod ring;
pub mod runtime;
pub mod scope;
pub mod sync;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use error::{Error, ErrorCategory, ErrorKind, Recoverability, Result};
pub use group::TaskGroup;
pub use promise::Promise;
pub use runtime::{spawn, yield_now, JoinHandle, Runtime, RuntimeBuilder};
pub use scope::{fail_after, fail_at, move_on_after, move_on_at, CancelScope, ScopeHandle, ScopeOutcome};
pub use time::{sleep, sleep_until};
pub use types::{CancelKind, CancelReason, Outcome, ScopeId, TaskId, Time};
