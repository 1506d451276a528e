//! Cancellation scopes.
//!
//! A [`CancelScope`] wraps a future with a nestable cancellation context:
//! an optional deadline, a manual cancel handle, and optional shielding.
//! When the scope is cancelled, every member task receives the signal at
//! its next suspension point; the wrapped body observes it as a
//! `Cancelled` error unwinding through ordinary `?` propagation.
//!
//! Two exit policies share that mechanism and differ only in what the
//! scope reports:
//!
//! - **absorb** ([`move_on_after`], [`CancelScope::run`]): the deadline
//!   firing is not an error; the caller sees that the body was cut short.
//! - **propagate** ([`fail_after`]): the deadline firing surfaces as a
//!   `TimedOut` error.
//!
//! Cancellation belonging to an *enclosing* scope always passes through
//! untouched; a scope only absorbs its own.

use crate::error::{Error, Result};
use crate::runtime::local;
use crate::tracing_compat::trace;
use crate::types::{CancelReason, ScopeId, Time};
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

/// How a scoped body ended.
#[derive(Debug)]
pub enum ScopeOutcome<T> {
    /// The body ran to completion.
    Completed(T),
    /// The scope's own cancellation cut the body short.
    CutShort(CancelReason),
}

#[derive(Debug, Default)]
struct HandleCell {
    scope: Cell<Option<ScopeId>>,
    cancel_early: Cell<bool>,
}

/// Cloneable handle for cancelling a scope manually, possibly from another
/// task.
#[derive(Debug, Clone)]
pub struct ScopeHandle {
    cell: Rc<HandleCell>,
}

impl ScopeHandle {
    /// Cancels the scope. Idempotent; before the scope is entered the
    /// cancellation is remembered and applied on entry.
    pub fn cancel(&self) {
        match self.cell.scope.get() {
            Some(scope) => {
                local::with_state(|state| {
                    state.cancel_scope(scope, CancelReason::user("cancelled via scope handle").with_origin(scope));
                });
            }
            None => self.cell.cancel_early.set(true),
        }
    }
}

/// A nestable cancellation context. Build, then [`run`](Self::run) a body
/// under it.
#[derive(Debug)]
pub struct CancelScope {
    deadline: Option<Time>,
    timeout: Option<Duration>,
    shield: bool,
    cell: Rc<HandleCell>,
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelScope {
    /// Creates a scope with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            deadline: None,
            timeout: None,
            shield: false,
            cell: Rc::new(HandleCell::default()),
        }
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Time) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to entry time.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shields the body from cancellation of enclosing scopes.
    #[must_use]
    pub fn shielded(mut self, shield: bool) -> Self {
        self.shield = shield;
        self
    }

    /// Returns a manual cancel handle.
    #[must_use]
    pub fn handle(&self) -> ScopeHandle {
        ScopeHandle {
            cell: Rc::clone(&self.cell),
        }
    }

    /// Runs `body` inside the scope (absorb policy at the boundary).
    pub fn run<T, F>(self, body: F) -> Scoped<F>
    where
        F: Future<Output = Result<T>>,
    {
        Scoped {
            inner: Box::pin(body),
            deadline: self.deadline,
            timeout: self.timeout,
            shield: self.shield,
            cell: self.cell,
            entered: None,
        }
    }
}

/// Future returned by [`CancelScope::run`].
pub struct Scoped<F> {
    inner: Pin<Box<F>>,
    deadline: Option<Time>,
    timeout: Option<Duration>,
    shield: bool,
    cell: Rc<HandleCell>,
    entered: Option<ScopeId>,
}

impl<F, T> Future for Scoped<F>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<ScopeOutcome<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.entered.is_none() {
            let opened = local::with_state(|state| {
                let deadline = this
                    .deadline
                    .or_else(|| this.timeout.map(|t| state.now() + t));
                let scope = state.open_scope(deadline, this.shield);
                if this.cell.cancel_early.get() {
                    state.cancel_scope(
                        scope,
                        CancelReason::user("cancelled via scope handle").with_origin(scope),
                    );
                }
                scope
            });
            match opened {
                Some(scope) => {
                    this.cell.scope.set(Some(scope));
                    this.entered = Some(scope);
                }
                None => panic!("cancellation scopes require a running runtime"),
            }
        }

        let output = match this.inner.as_mut().poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(output) => output,
        };

        let Some(scope) = this.entered.take() else {
            unreachable!("scope entered above");
        };
        local::with_state(|state| {
            state.close_scope(scope);
        });

        match output {
            Ok(value) => Poll::Ready(Ok(ScopeOutcome::Completed(value))),
            Err(err) => {
                let own = err
                    .cancel_reason()
                    .and_then(CancelReason::origin)
                    .is_some_and(|origin| origin == scope);
                if own {
                    // The unwind ends here; the task runs normally again.
                    local::with_state(|state| state.absorb_cancellation(scope));
                    let reason = err
                        .cancel_reason()
                        .cloned()
                        .unwrap_or_default();
                    trace!(scope = %scope, reason = %reason, "scope absorbed its own cancellation");
                    Poll::Ready(Ok(ScopeOutcome::CutShort(reason)))
                } else {
                    Poll::Ready(Err(err))
                }
            }
        }
    }
}

impl<F> Drop for Scoped<F> {
    fn drop(&mut self) {
        // Unwound without completing (the enclosing task is being torn
        // down): still detach the scope so stacks and timers stay clean.
        if let Some(scope) = self.entered.take() {
            local::with_state(|state| {
                state.close_scope(scope);
            });
        }
    }
}

impl<F> std::fmt::Debug for Scoped<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scoped")
            .field("entered", &self.entered)
            .finish_non_exhaustive()
    }
}

/// Runs `body` with a relative deadline; the deadline firing is absorbed.
///
/// Returns `Ok(Some(value))` if the body completed, `Ok(None)` if the
/// deadline cut it short. Other errors, including cancellation of an
/// enclosing scope, propagate.
///
/// # Errors
///
/// Everything except this scope's own cancellation.
pub async fn move_on_after<T, F>(timeout: Duration, body: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    match CancelScope::new().with_timeout(timeout).run(body).await? {
        ScopeOutcome::Completed(value) => Ok(Some(value)),
        ScopeOutcome::CutShort(_) => Ok(None),
    }
}

/// [`move_on_after`] with an absolute deadline.
///
/// # Errors
///
/// Everything except this scope's own cancellation.
pub async fn move_on_at<T, F>(deadline: Time, body: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    match CancelScope::new().with_deadline(deadline).run(body).await? {
        ScopeOutcome::Completed(value) => Ok(Some(value)),
        ScopeOutcome::CutShort(_) => Ok(None),
    }
}

/// Runs `body` with a relative deadline; the deadline firing surfaces as
/// a `TimedOut` error.
///
/// # Errors
///
/// [`Error::timed_out`] when the deadline fires; the body's own errors
/// and enclosing cancellations propagate unchanged.
pub async fn fail_after<T, F>(timeout: Duration, body: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let deadline = crate::runtime::now() + timeout;
    fail_at(deadline, body).await
}

/// [`fail_after`] with an absolute deadline.
///
/// # Errors
///
/// [`Error::timed_out`] when the deadline fires; the body's own errors
/// and enclosing cancellations propagate unchanged.
pub async fn fail_at<T, F>(deadline: Time, body: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match CancelScope::new().with_deadline(deadline).run(body).await? {
        ScopeOutcome::Completed(value) => Ok(value),
        ScopeOutcome::CutShort(reason) if reason.is_deadline() => {
            Err(Error::timed_out(deadline))
        }
        ScopeOutcome::CutShort(reason) => Err(Error::cancelled(reason)),
    }
}
