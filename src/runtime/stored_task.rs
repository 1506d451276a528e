//! Type-erased storage for spawned futures.
//!
//! A [`StoredTask`] owns the pinned, boxed future the scheduler polls. The
//! output type is erased: spawn wraps the user future so its result is
//! delivered through the task's completion promise, leaving `()` here.
//! Panics are caught at this boundary and reported as a payload instead of
//! unwinding into the scheduler loop.

use crate::tracing_compat::trace;
use crate::types::PanicPayload;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stored, pollable future. `!Send`: tasks never leave the runtime's
/// thread.
pub struct StoredTask {
    future: Pin<Box<dyn Future<Output = ()>>>,
    /// Settles the typed completion promise if the future panics before
    /// settling it itself.
    panic_hook: Option<Box<dyn FnOnce(PanicPayload)>>,
    polls: u64,
}

impl StoredTask {
    /// Boxes a future for storage.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + 'static,
    {
        Self {
            future: Box::pin(future),
            panic_hook: None,
            polls: 0,
        }
    }

    /// Attaches the panic-settlement hook.
    #[must_use]
    pub fn with_panic_hook(mut self, hook: impl FnOnce(PanicPayload) + 'static) -> Self {
        self.panic_hook = Some(Box::new(hook));
        self
    }

    /// Takes the panic hook, if one is attached.
    pub fn take_panic_hook(&mut self) -> Option<Box<dyn FnOnce(PanicPayload)>> {
        self.panic_hook.take()
    }

    /// Polls the stored future, catching panics.
    ///
    /// `Ready(Ok(()))` means the future completed (its wrapper already
    /// settled the completion promise); `Ready(Err(payload))` means it
    /// panicked and the caller must settle the task as panicked.
    pub fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), PanicPayload>> {
        self.polls += 1;
        match catch_unwind(AssertUnwindSafe(|| self.future.as_mut().poll(cx))) {
            Ok(Poll::Ready(())) => Poll::Ready(Ok(())),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => {
                let payload = PanicPayload::from_panic(&*payload);
                trace!(panic = %payload.message(), "task panicked during poll");
                Poll::Ready(Err(payload))
            }
        }
    }

    /// Returns how many times this task has been polled.
    #[must_use]
    pub const fn polls(&self) -> u64 {
        self.polls
    }
}

impl std::fmt::Debug for StoredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTask")
            .field("polls", &self.polls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_context_waker() -> Waker {
        Waker::from(Arc::new(NoopWaker))
    }

    #[test]
    fn completes_immediately_ready_future() {
        let mut task = StoredTask::new(async {});
        let waker = noop_context_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(matches!(task.poll(&mut cx), Poll::Ready(Ok(()))));
        assert_eq!(task.polls(), 1);
    }

    #[test]
    fn panic_is_captured() {
        let mut task = StoredTask::new(async {
            panic!("exploded");
        });
        let waker = noop_context_waker();
        let mut cx = Context::from_waker(&waker);

        match task.poll(&mut cx) {
            Poll::Ready(Err(payload)) => assert_eq!(payload.message(), "exploded"),
            other => panic!("expected panic capture, got {other:?}"),
        }
    }
}
