//! Waker implementation with FIFO deduplication.
//!
//! Promises wake tasks through standard `Waker`s. Wakes land in a shared
//! queue in wake order; the scheduler drains the queue and appends the
//! tasks to the current pass's run queue, which is what makes resumption
//! order follow settle order.

use crate::types::TaskId;
use std::sync::{Arc, Mutex};
use std::task::{Wake, Waker};

/// Shared wake queue.
#[derive(Debug, Default)]
pub struct WakerState {
    woken: Mutex<Vec<TaskId>>,
}

impl WakerState {
    /// Creates an empty wake queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a waker that enqueues `task` when woken.
    #[must_use]
    pub fn waker_for(self: &Arc<Self>, task: TaskId) -> Waker {
        Waker::from(Arc::new(TaskWaker {
            state: Arc::clone(self),
            task,
        }))
    }

    /// Drains the queue in wake order.
    pub fn drain(&self) -> Vec<TaskId> {
        let mut woken = self.woken.lock().expect("waker queue poisoned");
        std::mem::take(&mut *woken)
    }

    /// Returns true if any task has been woken since the last drain.
    #[must_use]
    pub fn has_woken(&self) -> bool {
        !self.woken.lock().expect("waker queue poisoned").is_empty()
    }

    fn wake(&self, task: TaskId) {
        let mut woken = self.woken.lock().expect("waker queue poisoned");
        if !woken.contains(&task) {
            woken.push(task);
        }
    }
}

struct TaskWaker {
    state: Arc<WakerState>,
    task: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.state.wake(self.task);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.state.wake(self.task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(n: u32) -> TaskId {
        TaskId::new_for_test(n, 0)
    }

    #[test]
    fn wake_order_is_preserved() {
        let state = Arc::new(WakerState::new());
        state.waker_for(task(2)).wake();
        state.waker_for(task(1)).wake();

        assert_eq!(state.drain(), vec![task(2), task(1)]);
        assert!(state.drain().is_empty());
    }

    #[test]
    fn duplicate_wakes_coalesce() {
        let state = Arc::new(WakerState::new());
        let waker = state.waker_for(task(1));
        waker.wake_by_ref();
        waker.wake_by_ref();
        waker.wake();

        assert_eq!(state.drain().len(), 1);
    }
}
