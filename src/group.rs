//! Task groups: structured concurrency with first-failure propagation.
//!
//! A [`TaskGroup`] owns the tasks spawned into it. The first member that
//! fails (a real failure, not cancellation) has its error recorded and
//! every sibling cancelled; failures produced during that fan-out are
//! discarded. `exit` waits until every member has reached a terminal
//! state and then reports the recorded failure, if any; [`TaskGroup::cancel`]
//! forces the members to unwind first when the caller will not wait for
//! them to finish on their own.
//!
//! The group's members stand inside a dedicated cancellation scope that
//! the spawning task does *not* enter, so a member failure cancels its
//! siblings without ripping the error past the code that will call
//! `exit`.

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::runtime::local;
use crate::runtime::task_handle::JoinHandle;
use crate::tracing_compat::{debug, warn};
use crate::types::{CancelReason, ScopeId};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

#[derive(Debug)]
struct GroupCore {
    scope: ScopeId,
    first_failure: Option<Error>,
    remaining: usize,
    closed: bool,
    on_quiescent: Vec<Promise<()>>,
}

/// A structured-concurrency container for spawned tasks.
#[derive(Debug)]
pub struct TaskGroup {
    core: Rc<RefCell<GroupCore>>,
}

impl TaskGroup {
    /// Opens an empty group.
    ///
    /// # Panics
    ///
    /// Panics outside a running runtime.
    #[must_use]
    pub fn enter() -> Self {
        let scope = local::with_state(|state| state.open_detached_scope())
            .expect("TaskGroup requires a running runtime");
        Self {
            core: Rc::new(RefCell::new(GroupCore {
                scope,
                first_failure: None,
                remaining: 0,
                closed: false,
                on_quiescent: Vec::new(),
            })),
        }
    }

    /// Spawns a member task.
    ///
    /// The member inherits the spawner's cancellation scopes plus the
    /// group's own scope. Its failure, if it is the group's first, cancels
    /// every other member.
    ///
    /// # Panics
    ///
    /// Panics if the group has been closed by `exit`.
    pub fn spawn<T, F>(&self, fut: F) -> JoinHandle<T>
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        let scope = {
            let core = self.core.borrow();
            assert!(!core.closed, "spawn on a closed TaskGroup");
            core.scope
        };
        let spawned = local::with_state(|state| {
            let mut inherit = state.current_scope_stack();
            if !inherit.contains(&scope) {
                inherit.push(scope);
            }
            state.spawn_in(fut, inherit, true)
        });
        let Some((task, promise)) = spawned else {
            panic!("TaskGroup::spawn requires a running runtime");
        };
        self.core.borrow_mut().remaining += 1;

        let core = Rc::clone(&self.core);
        promise.register_continuation(move |result| {
            let mut notify = Vec::new();
            let mut fan_out = None;
            {
                let mut group = core.borrow_mut();
                if let Err(err) = result {
                    if !err.is_cancelled() && group.first_failure.is_none() {
                        group.first_failure = Some(err.clone());
                        fan_out =
                            Some((group.scope, CancelReason::sibling_failed(group.scope)));
                    }
                }
                group.remaining -= 1;
                if group.remaining == 0 {
                    notify = std::mem::take(&mut group.on_quiescent);
                }
            }
            if let Some((scope, reason)) = fan_out {
                debug!(scope = %scope, "first member failure; cancelling siblings");
                local::with_state(|state| state.cancel_scope(scope, reason));
            }
            for waiter in notify {
                let _ = waiter.resolve(());
            }
        });
        JoinHandle::new(task, promise)
    }

    /// Waits until every current member has reached a terminal state,
    /// without cancelling anyone.
    ///
    /// # Errors
    ///
    /// Cancellation injected into the waiting task.
    pub async fn join(&self) -> Result<()> {
        self.wait_quiescent().await
    }

    /// Requests cancellation of every member.
    ///
    /// Members unwind at their next suspension point; `exit` still waits
    /// for each of them. Cancellation outcomes are not recorded as group
    /// failures.
    pub fn cancel(&self) {
        let scope = self.core.borrow().scope;
        local::with_state(|state| {
            state.cancel_scope(scope, CancelReason::parent(scope));
        });
    }

    /// Closes the group: waits until every member has reached a terminal
    /// state, then reports the first recorded failure.
    ///
    /// A member failure has already cancelled the other members by the
    /// time it is reported here. If the wait itself is cancelled from an
    /// enclosing scope, `exit` cancels all members, waits for them to
    /// unwind, and re-raises the enclosing cancellation.
    ///
    /// # Errors
    ///
    /// The first member failure, or the enclosing cancellation.
    pub async fn exit(self) -> Result<()> {
        let scope = {
            let mut core = self.core.borrow_mut();
            core.closed = true;
            core.scope
        };

        let result = match self.wait_quiescent().await {
            Ok(()) => {
                let failure = self.core.borrow_mut().first_failure.take();
                failure.map_or(Ok(()), Err)
            }
            Err(err) if err.is_cancelled() => {
                // Cancelled from an enclosing scope while joining: force
                // the members to unwind, wait once more, then re-raise.
                local::with_state(|state| {
                    state.cancel_scope(scope, CancelReason::parent(scope));
                });
                if self.wait_quiescent().await.is_err() {
                    warn!(scope = %scope, "group members did not unwind within the cleanup allowance");
                }
                Err(err)
            }
            Err(err) => Err(err),
        };

        local::with_state(|state| {
            state.close_scope(scope);
        });
        result
    }

    async fn wait_quiescent(&self) -> Result<()> {
        loop {
            let waiter = {
                let mut core = self.core.borrow_mut();
                if core.remaining == 0 {
                    return Ok(());
                }
                let waiter = Promise::new();
                core.on_quiescent.push(waiter.clone());
                waiter
            };
            waiter.wait().await?;
        }
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        let (closed, scope) = {
            let core = self.core.borrow();
            (core.closed, core.scope)
        };
        if closed {
            return;
        }
        // Dropped without exit(): members lose their joiner. Cancel them;
        // the scope record stays so the cancellation remains observable.
        warn!(scope = %scope, "TaskGroup dropped without exit(); cancelling members");
        local::with_state(|state| {
            state.cancel_scope(scope, CancelReason::parent(scope));
        });
    }
}
