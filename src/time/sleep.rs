//! Sleep futures backed by the scheduler's timer heap.
//!
//! To the caller a sleep is indistinguishable from any other pending
//! result: the task suspends and the scheduler loop resumes it when its
//! deadline is reached (wall clock) or jumped to (virtual time).

use crate::error::Result;
use crate::runtime::local;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::types::Time;

/// Sleeps for `duration` from the first poll.
#[must_use]
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: None,
        duration: Some(duration),
        armed: None,
    }
}

/// Sleeps until the absolute `deadline`.
#[must_use]
pub fn sleep_until(deadline: Time) -> Sleep {
    Sleep {
        deadline: Some(deadline),
        duration: None,
        armed: None,
    }
}

/// Future returned by [`sleep`] and [`sleep_until`].
///
/// A cancellation point: pending cancellation of the task is injected here
/// instead of waiting out the deadline. Dropping a `Sleep` disarms its
/// timer.
#[derive(Debug)]
pub struct Sleep {
    deadline: Option<Time>,
    duration: Option<Duration>,
    /// Timer generation, once armed.
    armed: Option<u64>,
}

impl Sleep {
    /// Returns the resolved deadline, if the sleep has been polled.
    #[must_use]
    pub fn deadline(&self) -> Option<Time> {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(err) = local::cancel_checkpoint() {
            return Poll::Ready(Err(err));
        }

        let polled = local::with_state(|state| {
            let deadline = match this.deadline {
                Some(deadline) => deadline,
                None => {
                    let deadline =
                        state.now() + this.duration.take().unwrap_or(Duration::ZERO);
                    this.deadline = Some(deadline);
                    deadline
                }
            };
            if state.now() >= deadline {
                if let Some(generation) = this.armed.take() {
                    state.disarm_timer(generation);
                }
                return Some(Ok(()));
            }
            if let Some(err) = state.before_suspend() {
                return Some(Err(err));
            }
            if this.armed.is_none() {
                let task = state
                    .current
                    .expect("sleep polled outside a task");
                this.armed = Some(state.arm_sleep(deadline, task));
            }
            None
        });

        match polled {
            None => panic!("sleep requires a running runtime"),
            Some(Some(ready)) => Poll::Ready(ready),
            Some(None) => Poll::Pending,
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(generation) = self.armed.take() {
            local::with_state(|state| state.disarm_timer(generation));
        }
    }
}
