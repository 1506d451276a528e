//! Thread-local access to the running runtime.
//!
//! The scheduler enters itself here for the duration of `block_on`; leaf
//! futures (promise waits, op futures, sleep, yield) reach the runtime
//! state through these functions. This is the only ambient authority in
//! the crate, and it is deliberately narrow: a leaf future can check for
//! pending cancellation, ask permission to suspend, and nothing else can
//! resume a task through it.

use crate::error::Error;
use crate::runtime::state::RuntimeState;
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<RuntimeState>>>> = const { RefCell::new(None) };
}

/// Guard that restores the previous runtime on drop.
pub(crate) struct EnterGuard {
    previous: Option<Rc<RefCell<RuntimeState>>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| {
            *current.borrow_mut() = self.previous.take();
        });
    }
}

/// Makes `state` the current runtime for this thread.
///
/// # Panics
///
/// Panics if a runtime is already current: `block_on` cannot nest.
pub(crate) fn enter(state: Rc<RefCell<RuntimeState>>) -> EnterGuard {
    CURRENT.with(|current| {
        let mut slot = current.borrow_mut();
        assert!(
            slot.is_none(),
            "cannot start a runtime from within a runtime"
        );
        let previous = slot.replace(state);
        EnterGuard { previous }
    })
}

/// Runs `f` with mutable access to the current runtime state.
///
/// Returns `None` when no runtime is current (for example, a future being
/// dropped after its runtime has gone away).
pub(crate) fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
    CURRENT.with(|current| {
        let rc = current.borrow().clone()?;
        let mut state = rc.borrow_mut();
        Some(f(&mut state))
    })
}

/// Cancellation checkpoint for leaf futures.
///
/// If the current task has a cancellation to deliver that has not been
/// injected yet, marks it injected and returns the error to yield at this
/// suspension point. Returns `None` outside a runtime.
pub(crate) fn cancel_checkpoint() -> Option<Error> {
    with_state(RuntimeState::cancel_checkpoint).flatten()
}

/// Gate an actual suspension.
///
/// A task that is unwinding after cancellation injection may suspend only
/// while its cleanup quota lasts; afterwards every suspension attempt
/// fails immediately with the stored cancellation. Returns `None` when the
/// suspension may proceed.
pub(crate) fn before_suspend() -> Option<Error> {
    with_state(RuntimeState::before_suspend).flatten()
}
