//! Voluntary yield point.

use crate::error::Result;
use crate::runtime::local;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Yields to the scheduler once.
///
/// The task is parked until the *next* scheduler pass, after the kernel
/// has been drained again, so a yield loop cannot starve I/O delivery.
/// This is also a cancellation point.
#[must_use]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(err) = local::cancel_checkpoint() {
            return Poll::Ready(Err(err));
        }
        if this.yielded {
            return Poll::Ready(Ok(()));
        }
        if let Some(err) = local::before_suspend() {
            return Poll::Ready(Err(err));
        }
        this.yielded = true;
        let deferred = local::with_state(|state| state.defer_current()).is_some();
        if !deferred {
            // No runtime (plain executor): fall back to an immediate wake.
            cx.waker().wake_by_ref();
        }
        Poll::Pending
    }
}
