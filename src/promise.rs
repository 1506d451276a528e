//! Single-assignment result cell: the unit a computation suspends on.
//!
//! A [`Promise`] starts pending and settles exactly once, either resolved
//! with a value or failed with an [`Error`]. Settling a settled promise is
//! a programming error reported as [`ErrorKind::AlreadySettled`].
//!
//! Continuations registered while pending run synchronously, in
//! registration order, inside the settling call; registering on an
//! already-settled promise invokes the continuation immediately, so there
//! is no missed-wakeup window. Wakers subscribed by awaiting tasks are
//! woken after the continuations, also in subscription order, which is what
//! keeps task resumption FIFO.
//!
//! Ownership is shared: the submitter keeps a handle to read the result,
//! the completion multiplexer (or the scheduler, for internal promises)
//! keeps one to settle it. The cell lives as long as the longer of the two.
//!
//! [`ErrorKind::AlreadySettled`]: crate::error::ErrorKind::AlreadySettled

use crate::error::{Error, Result};
use crate::runtime::local;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

type Continuation<T> = Box<dyn FnOnce(&Result<T>)>;

enum State<T> {
    /// Not settled yet.
    Pending,
    /// Mid-settle: the result is on the settling call's stack while its
    /// continuations run. Registrations arriving now are queued and drained
    /// before the settle call returns.
    Settling,
    /// Settled; the result has not been taken.
    Settled(Result<T>),
    /// Settled and the result was consumed by an awaiter.
    Taken,
}

struct Inner<T> {
    state: State<T>,
    continuations: Vec<Continuation<T>>,
    wakers: SmallVec<[Waker; 2]>,
}

/// A shared single-assignment result cell.
///
/// Cloning shares the same cell. The type is `!Send`; promises live on the
/// runtime's thread.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// Creates a pending promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                continuations: Vec::new(),
                wakers: SmallVec::new(),
            })),
        }
    }

    /// Resolves the promise with `value`.
    ///
    /// Runs every registered continuation, then wakes every subscribed
    /// waker, before returning.
    ///
    /// # Errors
    ///
    /// [`Error::already_settled`] if the promise is not pending.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.settle(Ok(value))
    }

    /// Fails the promise with `error`.
    ///
    /// # Errors
    ///
    /// [`Error::already_settled`] if the promise is not pending.
    pub fn fail(&self, error: Error) -> Result<()> {
        self.settle(Err(error))
    }

    /// Settles the promise with a prepared result.
    ///
    /// # Errors
    ///
    /// [`Error::already_settled`] if the promise is not pending.
    pub fn settle(&self, result: Result<T>) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                State::Pending => inner.state = State::Settling,
                _ => return Err(Error::already_settled()),
            }
        }
        self.run_continuations(&result);
        let wakers = {
            let mut inner = self.inner.borrow_mut();
            inner.state = State::Settled(result);
            std::mem::take(&mut inner.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    /// Registers a continuation to run when the promise settles.
    ///
    /// If the promise is already settled the continuation runs immediately,
    /// synchronously, before this call returns.
    pub fn register_continuation(&self, f: impl FnOnce(&Result<T>) + 'static) {
        {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.state, State::Pending | State::Settling) {
                inner.continuations.push(Box::new(f));
                return;
            }
        }
        // Already settled: run immediately with the borrow released. The
        // result is lent out of the cell while `f` (and anything it
        // registers) runs, then put back.
        let result = {
            let mut inner = self.inner.borrow_mut();
            match std::mem::replace(&mut inner.state, State::Settling) {
                State::Settled(result) => Some(result),
                State::Taken => {
                    inner.state = State::Taken;
                    None
                }
                State::Pending | State::Settling => unreachable!("checked settled above"),
            }
        };
        match result {
            Some(result) => {
                f(&result);
                self.run_continuations(&result);
                self.inner.borrow_mut().state = State::Settled(result);
            }
            None => {
                let taken: Result<T> = Err(Error::already_settled());
                f(&taken);
            }
        }
    }

    /// Runs queued continuations (and any they register) in order.
    fn run_continuations(&self, result: &Result<T>) {
        loop {
            let batch = std::mem::take(&mut self.inner.borrow_mut().continuations);
            if batch.is_empty() {
                break;
            }
            for f in batch {
                f(result);
            }
        }
    }

    /// Subscribes a waker to be woken when the promise settles.
    ///
    /// Duplicate subscriptions from the same task are coalesced.
    pub fn subscribe(&self, waker: &Waker) {
        {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.state, State::Pending | State::Settling) {
                if !inner.wakers.iter().any(|w| w.will_wake(waker)) {
                    inner.wakers.push(waker.clone());
                }
                return;
            }
        }
        waker.wake_by_ref();
    }

    /// Takes the settled result, if the promise has settled.
    ///
    /// Returns `None` while pending. Taking twice yields
    /// `Some(Err(already_settled))`: the value belongs to exactly one
    /// awaiter.
    pub fn try_take(&self) -> Option<Result<T>> {
        let mut inner = self.inner.borrow_mut();
        match std::mem::replace(&mut inner.state, State::Taken) {
            State::Pending => {
                inner.state = State::Pending;
                None
            }
            State::Settling => {
                inner.state = State::Settling;
                None
            }
            State::Settled(result) => Some(result),
            State::Taken => Some(Err(Error::already_settled())),
        }
    }

    /// Returns true if `other` is a handle to the same cell.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true once the promise has settled (taken or not).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(
            self.inner.borrow().state,
            State::Settled(_) | State::Taken
        )
    }

    /// Returns a future that waits for the promise and takes its result.
    ///
    /// Awaiting is a cancellation point: a pending cancellation of the
    /// current task is injected here instead of suspending.
    #[must_use]
    pub fn wait(&self) -> Wait<T> {
        Wait {
            promise: self.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        let state = match &inner.state {
            State::Pending => "pending",
            State::Settling => "settling",
            State::Settled(_) => "settled",
            State::Taken => "taken",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

/// Future returned by [`Promise::wait`].
#[derive(Debug)]
pub struct Wait<T> {
    promise: Promise<T>,
}

impl<T> Future for Wait<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(err) = local::cancel_checkpoint() {
            return Poll::Ready(Err(err));
        }
        if let Some(result) = self.promise.try_take() {
            return Poll::Ready(result);
        }
        if let Some(err) = local::before_suspend() {
            return Poll::Ready(Err(err));
        }
        self.promise.subscribe(cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn resolve_settles_once() {
        let p = Promise::new();
        assert!(p.resolve(1).is_ok());
        assert!(p.resolve(2).is_err());
        assert!(p.fail(Error::user("late")).is_err());
        assert_eq!(p.try_take(), Some(Ok(1)));
    }

    #[test]
    fn fail_settles_once() {
        let p: Promise<()> = Promise::new();
        assert!(p.fail(Error::user("boom")).is_ok());
        assert!(p.fail(Error::user("again")).is_err());
        assert_eq!(p.try_take(), Some(Err(Error::user("boom"))));
    }

    #[test]
    fn take_twice_reports_already_settled() {
        let p = Promise::new();
        p.resolve(7).unwrap();
        assert_eq!(p.try_take(), Some(Ok(7)));
        let second = p.try_take().unwrap();
        assert!(second.is_err());
    }

    #[test]
    fn continuations_run_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let p = Promise::new();
        for i in 0..3 {
            let order = Rc::clone(&order);
            p.register_continuation(move |_| order.borrow_mut().push(i));
        }

        assert!(order.borrow().is_empty());
        p.resolve(()).unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn continuation_on_settled_runs_immediately() {
        let p = Promise::new();
        p.resolve(41).unwrap();

        let seen = Rc::new(RefCell::new(None));
        let seen2 = Rc::clone(&seen);
        p.register_continuation(move |r| {
            *seen2.borrow_mut() = Some(r.as_ref().copied().unwrap());
        });
        assert_eq!(*seen.borrow(), Some(41));
    }

    #[test]
    fn continuation_registered_during_settle_still_runs() {
        let p: Promise<()> = Promise::new();
        let p2 = p.clone();
        let hits = Rc::new(RefCell::new(0));
        let hits2 = Rc::clone(&hits);
        let hits3 = Rc::clone(&hits);
        p.register_continuation(move |_| {
            *hits2.borrow_mut() += 1;
            p2.register_continuation(move |_| *hits3.borrow_mut() += 1);
        });

        p.resolve(()).unwrap();
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn continuations_run_exactly_once() {
        let hits = Rc::new(RefCell::new(0));
        let p = Promise::new();
        let hits2 = Rc::clone(&hits);
        p.register_continuation(move |_| *hits2.borrow_mut() += 1);

        p.resolve(()).unwrap();
        assert_eq!(*hits.borrow(), 1);
        // A failed re-settle must not re-run continuations.
        assert!(p.fail(Error::user("late")).is_err());
        assert_eq!(*hits.borrow(), 1);
    }
}
