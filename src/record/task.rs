//! Task record: the runtime's bookkeeping for one coroutine driver.
//!
//! State machine:
//!
//! ```text
//! Created ──► Running ◄──────────────┐
//!               │  │                 │ (woken)
//!               │  └── (suspended: not queued, registered on a promise)
//!               │
//!               │ cancel requested / scope cancelled
//!               ▼
//!         CancelRequested ──► Cancelling ──► Completed
//!               │   (injection at the next      ▲
//!               │    suspension point)          │
//!               └── Running ────────────────────┘ (ran to its end)
//! ```
//!
//! "Suspended" is not a stored state: a `Running` task that is neither
//! queued nor being polled is suspended on whatever promise holds its
//! waker. Only the scheduler loop moves a task out of that condition.

use crate::error::Error;
use crate::types::{CancelReason, Outcome, ScopeId, TaskId};

/// Outcome shape stored in the record (the typed value lives in the task's
/// completion promise).
pub type TaskOutcome = Outcome<(), Error>;

/// The lifecycle state of a task.
#[derive(Debug)]
pub enum TaskState {
    /// Spawned, never polled.
    Created,
    /// Pollable; may be queued, executing, or suspended on a promise.
    Running,
    /// Cancellation requested; the signal has not yet been injected.
    CancelRequested {
        /// Why the task is being cancelled.
        reason: CancelReason,
    },
    /// The cancellation signal was injected; the task is unwinding.
    Cancelling {
        /// The injected reason.
        reason: CancelReason,
        /// Suspensions the unwind may still perform before further
        /// suspension attempts fail immediately.
        cleanup_quota: u32,
    },
    /// Terminal.
    Completed(TaskOutcome),
}

impl TaskState {
    /// Returns true if the task reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns true if the cancellation signal was already injected.
    #[must_use]
    pub const fn is_cancelling(&self) -> bool {
        matches!(self, Self::Cancelling { .. })
    }
}

/// Internal record for one task.
#[derive(Debug)]
pub struct TaskRecord {
    /// The task's identity.
    pub id: TaskId,
    /// Lifecycle state.
    pub state: TaskState,
    /// Scope stack, outermost first. Spawned tasks inherit the spawner's
    /// stack; scopes entered by the task's own code are pushed on top.
    pub scopes: Vec<ScopeId>,
    /// The `JoinHandle` was dropped without consuming the result.
    pub detached: bool,
    /// The task belongs to a task group (its failures are reported there).
    pub group_member: bool,
    /// Number of times the task has been polled (for tracing).
    pub polls: u64,
}

impl TaskRecord {
    /// Creates a record in the `Created` state with the given inherited
    /// scope stack.
    #[must_use]
    pub fn new(id: TaskId, scopes: Vec<ScopeId>) -> Self {
        Self {
            id,
            state: TaskState::Created,
            scopes,
            detached: false,
            group_member: false,
            polls: 0,
        }
    }

    /// Requests cancellation of this task.
    ///
    /// Returns true if this was the first request. Later requests only
    /// strengthen the stored reason; a terminal task is left alone.
    pub fn request_cancel(&mut self, reason: CancelReason) -> bool {
        match &mut self.state {
            TaskState::Created | TaskState::Running => {
                self.state = TaskState::CancelRequested { reason };
                true
            }
            TaskState::CancelRequested {
                reason: existing, ..
            }
            | TaskState::Cancelling {
                reason: existing, ..
            } => {
                existing.strengthen(&reason);
                false
            }
            TaskState::Completed(_) => false,
        }
    }

    /// Returns the pending direct cancellation reason, if injection has not
    /// happened yet.
    #[must_use]
    pub fn pending_cancel(&self) -> Option<&CancelReason> {
        match &self.state {
            TaskState::CancelRequested { reason } => Some(reason),
            _ => None,
        }
    }

    /// Returns the innermost scope on the task's stack.
    #[must_use]
    pub fn current_scope(&self) -> Option<ScopeId> {
        self.scopes.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    fn record() -> TaskRecord {
        TaskRecord::new(TaskId::new_for_test(1, 0), Vec::new())
    }

    #[test]
    fn first_request_transitions() {
        let mut rec = record();
        assert!(rec.request_cancel(CancelReason::user("stop")));
        assert!(rec.pending_cancel().is_some());
        assert!(!rec.state.is_terminal());
    }

    #[test]
    fn second_request_strengthens() {
        let mut rec = record();
        rec.request_cancel(CancelReason::user("stop"));
        assert!(!rec.request_cancel(CancelReason::shutdown()));
        assert_eq!(
            rec.pending_cancel().map(CancelReason::kind),
            Some(CancelKind::Shutdown)
        );
    }

    #[test]
    fn terminal_task_ignores_cancel() {
        let mut rec = record();
        rec.state = TaskState::Completed(Outcome::Ok(()));
        assert!(!rec.request_cancel(CancelReason::user("late")));
        assert!(rec.state.is_terminal());
    }
}
