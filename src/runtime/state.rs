//! Runtime state and the scheduler loop.
//!
//! [`RuntimeState`] owns every mutable structure of the runtime: the task
//! table, the scope table, the run queue, the timer heap, the completion
//! map and the ring backend. It is held in an `Rc<RefCell<..>>`; the loop
//! releases the borrow around every user-code poll and around every
//! promise settlement, so user futures and continuations can re-enter the
//! state through [`local`](super::local).
//!
//! One loop iteration ("pass"):
//!
//! 1. drain the ring, non-blocking, and settle the matching promises:
//!    every completion available now is delivered before any task runs;
//! 2. fire expired timers (waking sleepers, cancelling deadline scopes);
//! 3. resume ready tasks FIFO until the queue is empty, appending tasks
//!    that become ready mid-pass to the same pass;
//! 4. if nothing happened, block on the ring bounded by the next timer
//!    deadline (or jump the virtual clock to it).
//!
//! The loop terminates when no task remains. This is the only place a
//! suspended computation resumes; scheduling is strictly cooperative.

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::record::{ScopeRecord, TaskRecord, TaskState};
use crate::ring::{Op, Ring, Token};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::local;
use crate::runtime::multiplexer::{CompletionMap, OpOutput, PendingSettle};
use crate::runtime::scheduler::RunQueue;
use crate::runtime::stored_task::StoredTask;
use crate::runtime::task_table::TaskTable;
use crate::runtime::timer::{TimerHeap, TimerTarget};
use crate::runtime::waker::WakerState;
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{CancelReason, Outcome, ScopeId, TaskId, Time};
use crate::util::Arena;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Time source: wall clock or scheduler-advanced virtual time.
#[derive(Debug)]
pub enum Clock {
    /// Monotonic wall clock, zeroed at runtime creation.
    Wall {
        /// The instant that maps to [`Time::ZERO`].
        origin: Instant,
    },
    /// Virtual time; advances only when the loop jumps it to a deadline.
    Virtual {
        /// The current virtual instant.
        now: Time,
    },
}

impl Clock {
    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Time {
        match self {
            Self::Wall { origin } => {
                let nanos = origin.elapsed().as_nanos();
                Time::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
            Self::Virtual { now } => *now,
        }
    }

    /// Jumps a virtual clock forward; no-op on a wall clock or backwards.
    pub fn advance_to(&mut self, target: Time) {
        if let Self::Virtual { now } = self {
            if target > *now {
                *now = target;
            }
        }
    }
}

/// All mutable runtime state.
#[derive(Debug)]
pub struct RuntimeState {
    pub(crate) config: RuntimeConfig,
    pub(crate) clock: Clock,
    pub(crate) tasks: TaskTable,
    pub(crate) scopes: Arena<ScopeRecord>,
    pub(crate) queue: RunQueue,
    pub(crate) timers: TimerHeap,
    pub(crate) completions: CompletionMap,
    pub(crate) wakes: Arc<WakerState>,
    pub(crate) ring: Box<dyn Ring>,
    /// The task whose code is executing right now, if any.
    pub(crate) current: Option<TaskId>,
}

impl RuntimeState {
    /// Creates runtime state over a ring backend.
    #[must_use]
    pub fn new(config: RuntimeConfig, ring: Box<dyn Ring>) -> Self {
        let clock = if config.virtual_time {
            Clock::Virtual { now: Time::ZERO }
        } else {
            Clock::Wall {
                origin: Instant::now(),
            }
        };
        let completions = CompletionMap::with_batch_capacity(config.completion_batch);
        Self {
            config,
            clock,
            tasks: TaskTable::new(),
            scopes: Arena::new(),
            queue: RunQueue::new(),
            timers: TimerHeap::new(),
            completions,
            wakes: Arc::new(WakerState::new()),
            ring,
            current: None,
        }
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    // ----- spawning ---------------------------------------------------

    /// Spawns a future as a task with the given inherited scope stack.
    ///
    /// Returns the task ID and its completion promise. The future's result
    /// is classified at completion: a value produced while the task was
    /// unwinding is overridden by the cancellation.
    pub(crate) fn spawn_in<T, F>(
        &mut self,
        fut: F,
        inherit: Vec<ScopeId>,
        group_member: bool,
    ) -> (TaskId, Promise<T>)
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        let completion: Promise<T> = Promise::new();

        let id = self.tasks.insert(|placeholder| {
            let mut record = TaskRecord::new(placeholder, inherit.clone());
            record.group_member = group_member;
            record
        });
        for sid in &inherit {
            if let Some(scope) = self.scopes.get_mut(sid.arena_index()) {
                scope.add_member(id);
            }
        }

        let settle_handle = completion.clone();
        let wrapped = async move {
            let result = fut.await;
            // Cancellation injected into this task wins over a late value.
            let unwinding = local::with_state(RuntimeState::current_cancelling_reason).flatten();
            let settled: Result<T> = match (result, unwinding) {
                (Ok(_), Some(reason)) => Err(Error::cancelled(reason)),
                (Ok(value), None) => Ok(value),
                (Err(err), _) => Err(err),
            };
            let summary = match &settled {
                Ok(_) => Outcome::Ok(()),
                Err(err) if err.is_cancelled() => {
                    Outcome::Cancelled(err.cancel_reason().cloned().unwrap_or_default())
                }
                Err(err) => Outcome::Err(err.clone()),
            };
            local::with_state(|state| state.record_current_completion(summary));
            let _ = settle_handle.settle(settled);
        };

        let panic_handle = completion.clone();
        let stored = StoredTask::new(wrapped).with_panic_hook(move |payload| {
            let _ = panic_handle.settle(Err(Error::panicked(payload)));
        });
        self.tasks.store_future(id, stored);
        self.queue.schedule(id);
        trace!(task = %id, "task spawned");
        (id, completion)
    }

    /// Returns the scope stack of the current task (for spawn inheritance).
    #[must_use]
    pub(crate) fn current_scope_stack(&self) -> Vec<ScopeId> {
        self.current
            .and_then(|id| self.tasks.get(id))
            .map(|record| record.scopes.clone())
            .unwrap_or_default()
    }

    /// Marks the terminal state of the currently executing task.
    fn record_current_completion(&mut self, summary: Outcome<(), Error>) {
        let Some(id) = self.current else { return };
        if let Some(record) = self.tasks.get_mut(id) {
            record.state = TaskState::Completed(summary);
        }
    }

    /// Returns the injected cancellation reason if the current task is
    /// unwinding.
    fn current_cancelling_reason(&mut self) -> Option<CancelReason> {
        let id = self.current?;
        match &self.tasks.get(id)?.state {
            TaskState::Cancelling { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    // ----- cancellation -----------------------------------------------

    /// Cancellation checkpoint (see [`local::cancel_checkpoint`]).
    pub(crate) fn cancel_checkpoint(&mut self) -> Option<Error> {
        let id = self.current?;
        let record = self.tasks.get(id)?;
        let pending = match &record.state {
            TaskState::Cancelling { .. } | TaskState::Completed(_) => return None,
            TaskState::CancelRequested { reason } => reason.clone(),
            TaskState::Created | TaskState::Running => {
                self.scope_cancellation_for(&record.scopes)?
            }
        };
        let quota = self.config.cleanup_quota;
        if let Some(record) = self.tasks.get_mut(id) {
            record.state = TaskState::Cancelling {
                reason: pending.clone(),
                cleanup_quota: quota,
            };
        }
        trace!(task = %id, reason = %pending, "cancellation injected");
        Some(Error::cancelled(pending))
    }

    /// Scans a scope stack innermost-out for a cancelled scope, stopping at
    /// the first shield.
    fn scope_cancellation_for(&self, stack: &[ScopeId]) -> Option<CancelReason> {
        for sid in stack.iter().rev() {
            let Some(scope) = self.scopes.get(sid.arena_index()) else {
                continue; // exited scope, stale id
            };
            if let Some(reason) = &scope.cancelled {
                return Some(reason.clone());
            }
            if scope.shield {
                return None;
            }
        }
        None
    }

    /// Returns the current task to `Running` after a scope boundary caught
    /// its own cancellation.
    ///
    /// The unwind is over at that boundary; later suspensions are ordinary
    /// again, and a still-cancelled enclosing scope re-injects at the next
    /// checkpoint with its own origin.
    pub(crate) fn absorb_cancellation(&mut self, scope: ScopeId) {
        let Some(id) = self.current else { return };
        let Some(record) = self.tasks.get_mut(id) else {
            return;
        };
        if let TaskState::Cancelling { reason, .. } = &record.state {
            if reason.origin() == Some(scope) {
                record.state = TaskState::Running;
            }
        }
    }

    /// Suspension gate (see [`local::before_suspend`]).
    pub(crate) fn before_suspend(&mut self) -> Option<Error> {
        let id = self.current?;
        match &mut self.tasks.get_mut(id)?.state {
            TaskState::Cancelling {
                reason,
                cleanup_quota,
            } => {
                if *cleanup_quota > 0 {
                    *cleanup_quota -= 1;
                    None
                } else {
                    Some(Error::cancelled(reason.clone()))
                }
            }
            _ => None,
        }
    }

    /// Requests direct cancellation of a task and gets it scheduled for
    /// prompt injection.
    pub(crate) fn request_task_cancel(&mut self, task: TaskId, reason: CancelReason) {
        let Some(record) = self.tasks.get_mut(task) else {
            return;
        };
        if record.state.is_terminal() {
            return;
        }
        record.request_cancel(reason);
        if self.current != Some(task) {
            self.queue.schedule_cancel(task);
        }
    }

    /// Cancels a scope: sets the monotone flag and schedules every member
    /// for cancellation injection at its suspension point.
    pub(crate) fn cancel_scope(&mut self, scope: ScopeId, reason: CancelReason) {
        let Some(record) = self.scopes.get_mut(scope.arena_index()) else {
            return;
        };
        let first = record.cancel(reason.clone());
        if first {
            debug!(scope = %scope, reason = %reason, "scope cancelled");
        }
        let members = record.members.clone();
        for task in members {
            if self.current != Some(task) {
                self.queue.schedule_cancel(task);
            }
        }
    }

    // ----- scopes -----------------------------------------------------

    /// Creates a scope, pushes it on the current task's stack and arms its
    /// deadline timer.
    pub(crate) fn open_scope(
        &mut self,
        deadline: Option<Time>,
        shield: bool,
    ) -> ScopeId {
        let parent = self
            .current
            .and_then(|id| self.tasks.get(id))
            .and_then(TaskRecord::current_scope);
        let placeholder = ScopeId::from_arena(crate::util::ArenaIndex::new(0, 0));
        let index = self
            .scopes
            .insert(ScopeRecord::new(placeholder, parent, deadline, shield));
        let sid = ScopeId::from_arena(index);
        if let Some(record) = self.scopes.get_mut(index) {
            record.id = sid;
            if let Some(deadline) = deadline {
                record.timer_generation =
                    Some(self.timers.insert(deadline, TimerTarget::CancelScope(sid)));
            }
        }
        if let Some(task) = self.current {
            if let Some(record) = self.tasks.get_mut(task) {
                record.scopes.push(sid);
            }
            if let Some(scope) = self.scopes.get_mut(index) {
                scope.add_member(task);
            }
        }
        trace!(scope = %sid, "scope opened");
        sid
    }

    /// Creates a scope that is *not* entered by the current task: the
    /// container scope of a task group. Only spawned members stand inside.
    pub(crate) fn open_detached_scope(&mut self) -> ScopeId {
        let parent = self
            .current
            .and_then(|id| self.tasks.get(id))
            .and_then(TaskRecord::current_scope);
        let placeholder = ScopeId::from_arena(crate::util::ArenaIndex::new(0, 0));
        let index = self
            .scopes
            .insert(ScopeRecord::new(placeholder, parent, None, false));
        let sid = ScopeId::from_arena(index);
        if let Some(record) = self.scopes.get_mut(index) {
            record.id = sid;
        }
        sid
    }

    /// Closes a scope: disarms its timer, detaches it from the current
    /// task's stack and frees the record.
    ///
    /// Returns the record so the caller can inspect the cancelled flag.
    pub(crate) fn close_scope(&mut self, scope: ScopeId) -> Option<ScopeRecord> {
        let record = self.scopes.remove(scope.arena_index())?;
        if let Some(generation) = record.timer_generation {
            self.timers.disarm(generation);
        }
        if let Some(task) = self.current {
            if let Some(task_record) = self.tasks.get_mut(task) {
                match task_record.scopes.last() {
                    Some(top) if *top == scope => {
                        task_record.scopes.pop();
                    }
                    _ => task_record.scopes.retain(|s| *s != scope),
                }
            }
        }
        trace!(scope = %scope, "scope closed");
        Some(record)
    }

    // ----- ring operations --------------------------------------------

    /// Submits an operation and registers its promise in the completion
    /// map.
    ///
    /// # Errors
    ///
    /// [`Error::queue_full`] on submission backpressure; the caller may
    /// retry after completions are reaped.
    pub(crate) fn submit_op(&mut self, op: Op) -> Result<(Token, Promise<OpOutput>)> {
        let kind = op.kind();
        let token = self.ring.submit(op).map_err(Error::from)?;
        let promise = Promise::new();
        self.completions.register(token, promise.clone())?;
        trace!(token = %token, op = %kind, "operation submitted");
        Ok((token, promise))
    }

    /// Abandons an in-flight operation: unregisters its promise and asks
    /// the ring for best-effort cancellation. Its completion, if it still
    /// arrives, is discarded by the multiplexer.
    pub(crate) fn abandon_op(&mut self, token: Token) {
        if self.completions.abandon(token) {
            trace!(token = %token, "operation abandoned");
            if let Err(err) = self.ring.cancel(token) {
                debug!(token = %token, error = %err, "ring cancel failed");
            }
        }
    }

    // ----- timers -----------------------------------------------------

    /// Arms a wake-task timer; returns the generation for disarming.
    pub(crate) fn arm_sleep(&mut self, deadline: Time, task: TaskId) -> u64 {
        self.timers.insert(deadline, TimerTarget::Wake(task))
    }

    /// Disarms a timer by generation.
    pub(crate) fn disarm_timer(&mut self, generation: u64) {
        self.timers.disarm(generation);
    }

    /// Parks the current task until the next scheduler pass.
    pub(crate) fn defer_current(&mut self) {
        if let Some(task) = self.current {
            self.queue.defer(task);
        }
    }

    // ----- scheduler internals ----------------------------------------

    /// Moves the waker queue into the run queue, preserving wake order.
    fn drain_wakes(&mut self) {
        for task in self.wakes.drain() {
            let Some(record) = self.tasks.get(task) else {
                continue; // task retired; stale waker
            };
            match record.state {
                TaskState::Completed(_) => {}
                TaskState::CancelRequested { .. } | TaskState::Cancelling { .. } => {
                    self.queue.schedule_cancel(task);
                }
                TaskState::Created | TaskState::Running => self.queue.schedule(task),
            }
        }
    }

    /// Drains the ring through the multiplexer.
    fn drain_completions(&mut self) -> std::io::Result<Vec<PendingSettle>> {
        self.completions.drain(self.ring.as_mut())
    }

    /// Fires expired timers. Returns how many fired.
    fn fire_timers(&mut self) -> usize {
        let now = self.clock.now();
        let targets = self.timers.pop_expired(now);
        let fired = targets.len();
        for target in targets {
            match target {
                TimerTarget::Wake(task) => {
                    if self.tasks.get(task).is_some() {
                        trace!(task = %task, "sleep expired");
                        self.queue.schedule(task);
                    }
                }
                TimerTarget::CancelScope(scope) => {
                    self.cancel_scope(scope, CancelReason::deadline(scope));
                }
            }
        }
        fired
    }

    /// Retires a terminal task: removes it from the table, the queue and
    /// its scopes' member lists, and reports unobserved failures.
    fn retire(&mut self, id: TaskId) {
        let Some(record) = self.tasks.remove(id) else {
            return;
        };
        self.queue.remove(id);
        for sid in &record.scopes {
            if let Some(scope) = self.scopes.get_mut(sid.arena_index()) {
                scope.remove_member(id);
            }
        }
        match &record.state {
            TaskState::Completed(outcome) => {
                trace!(task = %id, outcome = %outcome, "task retired");
                let failed = outcome.is_err() || outcome.is_panicked();
                if failed
                    && record.detached
                    && !record.group_member
                    && self.config.warn_unobserved_failures
                {
                    warn!(task = %id, outcome = %outcome, "task failed but nothing will observe the error");
                }
            }
            _ => {
                warn!(task = %id, "task retired without reaching a terminal state");
            }
        }
    }
}

/// Runs the scheduler loop until no task remains, then returns.
///
/// # Panics
///
/// Panics on ring backend failures and on deadlock (live tasks with no
/// ready work, no in-flight operation and no timer).
pub(crate) fn run(state: &Rc<RefCell<RuntimeState>>) {
    loop {
        let mut progressed = false;

        // (1) Completion multiplexer: drain to exhaustion, settle before
        // any task resumes.
        let settles = {
            let mut s = state.borrow_mut();
            s.queue.start_pass();
            s.drain_completions()
                .unwrap_or_else(|err| panic!("ring drain failed: {err}"))
        };
        progressed |= !settles.is_empty();
        for (promise, result) in settles {
            let _ = promise.settle(result);
        }

        // (2) Timers.
        {
            let mut s = state.borrow_mut();
            progressed |= s.fire_timers() > 0;
            s.drain_wakes();
        }

        // (3) Resume ready tasks FIFO; tasks readied mid-pass join the
        // same pass.
        loop {
            let next = {
                let mut s = state.borrow_mut();
                s.queue.pop()
            };
            let Some(task) = next else { break };
            progressed = true;
            poll_task(state, task);
            state.borrow_mut().drain_wakes();
        }

        // (4) Termination / blocking decision.
        enum Idle {
            Done,
            Continue,
            WaitRing(Option<Duration>),
            SleepWall(Duration),
            AdvanceVirtual(Time),
            ProbeVirtualRing { fallback: Option<Time> },
        }
        let idle = {
            let mut s = state.borrow_mut();
            if s.tasks.is_empty() {
                Idle::Done
            } else if !s.queue.is_empty() || s.queue.has_deferred() || s.wakes.has_woken() {
                Idle::Continue
            } else if progressed {
                Idle::Continue
            } else {
                let now = s.clock.now();
                let deadline = s.timers.next_deadline();
                let in_flight = s.ring.in_flight();
                let virtual_time = matches!(s.clock, Clock::Virtual { .. });
                match (virtual_time, in_flight > 0, deadline) {
                    (false, true, d) => Idle::WaitRing(d.map(|d| d.duration_since(now))),
                    (false, false, Some(d)) => Idle::SleepWall(d.duration_since(now)),
                    (true, true, d) => Idle::ProbeVirtualRing { fallback: d },
                    (true, false, Some(d)) => Idle::AdvanceVirtual(d),
                    (_, false, None) => {
                        panic!(
                            "deadlock: {} task(s) suspended with no pending operation or timer",
                            s.tasks.len()
                        );
                    }
                }
            }
        };

        match idle {
            Idle::Done => break,
            Idle::Continue => {}
            Idle::WaitRing(timeout) => {
                let mut s = state.borrow_mut();
                if let Err(err) = s.ring.wait(timeout) {
                    if err.kind() == std::io::ErrorKind::WouldBlock {
                        panic!("deadlock: all tasks waiting on ring operations that cannot complete");
                    }
                    panic!("ring wait failed: {err}");
                }
            }
            Idle::SleepWall(duration) => {
                if !duration.is_zero() {
                    std::thread::sleep(duration);
                }
            }
            Idle::AdvanceVirtual(deadline) => {
                state.borrow_mut().clock.advance_to(deadline);
            }
            Idle::ProbeVirtualRing { fallback } => {
                let mut s = state.borrow_mut();
                match s.ring.wait(None) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        match fallback {
                            Some(deadline) => s.clock.advance_to(deadline),
                            None => panic!(
                                "deadlock: all tasks waiting on ring operations that cannot complete"
                            ),
                        }
                    }
                    Err(err) => panic!("ring wait failed: {err}"),
                }
            }
        }
    }
}

/// Polls one task, with the state borrow released around the poll.
fn poll_task(state: &Rc<RefCell<RuntimeState>>, id: TaskId) {
    let (mut stored, waker) = {
        let mut s = state.borrow_mut();
        let Some(record) = s.tasks.get_mut(id) else {
            return; // retired between scheduling and polling
        };
        if record.state.is_terminal() {
            return;
        }
        if matches!(record.state, TaskState::Created) {
            record.state = TaskState::Running;
        }
        record.polls += 1;
        let Some(stored) = s.tasks.take_future(id) else {
            return;
        };
        s.current = Some(id);
        (stored, s.wakes.waker_for(id))
    };

    let mut cx = Context::from_waker(&waker);
    let poll = stored.poll(&mut cx);

    // Settling the panic outcome runs continuations (group callbacks), so
    // it happens after the borrow is released; dropping the future runs
    // user destructors (scope guards), so that too stays outside.
    let mut settle_panic = None;
    match poll {
        Poll::Pending => {
            let mut s = state.borrow_mut();
            s.current = None;
            s.tasks.store_future(id, stored);
        }
        Poll::Ready(Ok(())) => {
            let mut s = state.borrow_mut();
            s.current = None;
            s.retire(id);
            drop(s);
            drop(stored);
        }
        Poll::Ready(Err(payload)) => {
            {
                let mut s = state.borrow_mut();
                s.current = None;
                if let Some(record) = s.tasks.get_mut(id) {
                    record.state =
                        TaskState::Completed(Outcome::Panicked(payload.clone()));
                }
                s.retire(id);
            }
            settle_panic = stored.take_panic_hook().map(|hook| (hook, payload));
            drop(stored);
        }
    }
    if let Some((hook, payload)) = settle_panic {
        hook(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::LabRing;

    fn lab_state() -> Rc<RefCell<RuntimeState>> {
        let (ring, _handle) = LabRing::auto();
        let config = RuntimeConfig {
            virtual_time: true,
            ..RuntimeConfig::default()
        };
        Rc::new(RefCell::new(RuntimeState::new(config, Box::new(ring))))
    }

    #[test]
    fn virtual_clock_never_goes_backwards() {
        let mut clock = Clock::Virtual { now: Time::ZERO };
        clock.advance_to(Time::from_millis(50));
        assert_eq!(clock.now(), Time::from_millis(50));
        clock.advance_to(Time::from_millis(10));
        assert_eq!(clock.now(), Time::from_millis(50));
    }

    #[test]
    fn run_drives_a_spawned_future_to_completion() {
        let state = lab_state();
        let (task, promise) =
            state
                .borrow_mut()
                .spawn_in(async { Ok::<_, Error>(5) }, Vec::new(), false);

        let guard = local::enter(Rc::clone(&state));
        run(&state);
        drop(guard);

        assert!(state.borrow().tasks.get(task).is_none(), "task retired");
        assert_eq!(promise.try_take().expect("settled").expect("ok"), 5);
    }

    #[test]
    fn direct_cancel_produces_a_cancelled_result() {
        let state = lab_state();
        let (task, promise) = state.borrow_mut().spawn_in(
            async {
                crate::time::sleep(std::time::Duration::from_secs(60)).await?;
                Ok::<_, Error>(())
            },
            Vec::new(),
            false,
        );
        state
            .borrow_mut()
            .request_task_cancel(task, CancelReason::user("test"));

        let guard = local::enter(Rc::clone(&state));
        run(&state);
        drop(guard);

        let err = promise.try_take().expect("settled").expect_err("cancelled");
        assert!(err.is_cancelled());
    }
}
