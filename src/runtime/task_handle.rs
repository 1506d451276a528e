//! Join handle for spawned tasks.

use crate::error::Result;
use crate::promise::Promise;
use crate::runtime::local;
use crate::tracing_compat::trace;
use crate::types::{CancelReason, TaskId};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Owner's handle to a spawned task.
///
/// Awaiting the handle takes the task's result: the value it returned, the
/// error it failed with, or a `Cancelled`/`Panicked` error. The handle is
/// itself a suspension point, so awaiting it is cancellable.
///
/// Dropping the handle detaches the task: it keeps running, but a failure
/// it produces afterwards has no observer (the runtime logs such failures
/// at WARN unless the task belongs to a group).
#[derive(Debug)]
pub struct JoinHandle<T> {
    task: TaskId,
    promise: Promise<T>,
    consumed: bool,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(task: TaskId, promise: Promise<T>) -> Self {
        Self {
            task,
            promise,
            consumed: false,
        }
    }

    /// Returns the task's ID.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task
    }

    /// Returns true once the task has reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.promise.is_settled()
    }

    /// Requests cooperative cancellation of the task.
    ///
    /// The signal is injected at the task's next suspension point; awaiting
    /// the handle then yields a `Cancelled` error.
    pub fn cancel(&self) {
        trace!(task = %self.task, "cancel requested via join handle");
        local::with_state(|state| {
            state.request_task_cancel(
                self.task,
                CancelReason::user("cancelled via join handle"),
            );
        });
    }

}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(err) = local::cancel_checkpoint() {
            return Poll::Ready(Err(err));
        }
        if let Some(result) = this.promise.try_take() {
            this.consumed = true;
            return Poll::Ready(result);
        }
        if let Some(err) = local::before_suspend() {
            return Poll::Ready(Err(err));
        }
        this.promise.subscribe(cx.waker());
        Poll::Pending
    }
}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        let task = self.task;
        local::with_state(|state| {
            if let Some(record) = state.tasks.get_mut(task) {
                record.detached = true;
            }
        });
    }
}

/// Spawns a future onto the current runtime.
///
/// The task inherits the spawner's cancellation scopes: cancelling a scope
/// the spawner stood in at spawn time also cancels the new task.
///
/// # Panics
///
/// Panics if called outside a running runtime.
pub fn spawn<T, F>(fut: F) -> JoinHandle<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    let spawned = local::with_state(|state| {
        let inherit = state.current_scope_stack();
        state.spawn_in(fut, inherit, false)
    });
    match spawned {
        Some((task, promise)) => JoinHandle::new(task, promise),
        None => panic!("spawn requires a running runtime"),
    }
}
