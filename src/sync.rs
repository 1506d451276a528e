//! Synchronization primitives for tasks.
//!
//! All of these are pure in-process coordination: no OS blocking, no
//! locking discipline. They are built on promise wait queues, so waiting
//! on any of them is an ordinary suspension point (and therefore a
//! cancellation point).

use crate::error::Result;
use crate::promise::Promise;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A one-way flag tasks can wait on.
///
/// `set` is sticky: once set, every current and future `wait` completes
/// immediately.
#[derive(Debug, Clone, Default)]
pub struct Event {
    inner: Rc<RefCell<EventState>>,
}

#[derive(Debug, Default)]
struct EventState {
    set: bool,
    waiters: Vec<Promise<()>>,
}

impl Event {
    /// Creates an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the event has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.borrow().set
    }

    /// Sets the event and wakes every waiter, in wait order.
    pub fn set(&self) {
        let waiters = {
            let mut state = self.inner.borrow_mut();
            if state.set {
                return;
            }
            state.set = true;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            let _ = waiter.resolve(());
        }
    }

    /// Waits until the event is set.
    ///
    /// # Errors
    ///
    /// Cancellation injected into the waiting task.
    pub async fn wait(&self) -> Result<()> {
        let waiter = {
            let mut state = self.inner.borrow_mut();
            if state.set {
                return Ok(());
            }
            let waiter = Promise::new();
            state.waiters.push(waiter.clone());
            waiter
        };
        waiter.wait().await
    }
}

/// A counting semaphore with strict FIFO handoff.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Rc<RefCell<SemaphoreState>>,
}

#[derive(Debug)]
struct SemaphoreState {
    permits: usize,
    waiters: VecDeque<Promise<()>>,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SemaphoreState {
                permits,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Returns the number of currently available permits.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.borrow().permits
    }

    /// Acquires one permit, waiting if none is available.
    ///
    /// # Errors
    ///
    /// Cancellation injected into the waiting task. A permit handed over
    /// concurrently with the cancellation is released back, never lost.
    pub async fn acquire(&self) -> Result<()> {
        let waiter = {
            let mut state = self.inner.borrow_mut();
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            let waiter = Promise::new();
            state.waiters.push_back(waiter.clone());
            waiter
        };
        match waiter.wait().await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Leave the queue; if release() already handed us the
                // permit, pass it on.
                let handed_over = {
                    let mut state = self.inner.borrow_mut();
                    let before = state.waiters.len();
                    state.waiters.retain(|w| !w.same_cell(&waiter));
                    state.waiters.len() == before
                };
                if handed_over {
                    self.release();
                }
                Err(err)
            }
        }
    }

    /// Releases one permit, handing it to the oldest waiter if any.
    pub fn release(&self) {
        let next = {
            let mut state = self.inner.borrow_mut();
            match state.waiters.pop_front() {
                Some(waiter) => Some(waiter),
                None => {
                    state.permits += 1;
                    None
                }
            }
        };
        if let Some(waiter) = next {
            let _ = waiter.resolve(());
        }
    }
}

/// A mutual-exclusion lock with an RAII guard.
#[derive(Debug, Clone)]
pub struct Lock {
    semaphore: Semaphore,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            semaphore: Semaphore::new(1),
        }
    }

    /// Returns true if the lock is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.semaphore.available() == 0
    }

    /// Acquires the lock; the guard releases it on drop.
    ///
    /// # Errors
    ///
    /// Cancellation injected into the waiting task.
    pub async fn lock(&self) -> Result<LockGuard> {
        self.semaphore.acquire().await?;
        Ok(LockGuard {
            semaphore: self.semaphore.clone(),
        })
    }
}

/// Guard returned by [`Lock::lock`]; releases the lock on drop.
#[derive(Debug)]
pub struct LockGuard {
    semaphore: Semaphore,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_set_is_sticky() {
        let event = Event::new();
        assert!(!event.is_set());
        event.set();
        event.set();
        assert!(event.is_set());
    }

    #[test]
    fn semaphore_counts_permits() {
        let sem = Semaphore::new(2);
        assert_eq!(sem.available(), 2);
        sem.release();
        assert_eq!(sem.available(), 3);
    }
}
