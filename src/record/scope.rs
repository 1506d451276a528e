//! Scope record: the runtime's bookkeeping for one cancellation scope.

use crate::types::{CancelReason, ScopeId, TaskId, Time};

/// Internal record for one cancellation scope.
///
/// Scopes nest through `parent`; a task standing inside a scope also stands
/// inside every ancestor. `cancelled` is monotone: once set it never
/// clears, later cancellations only strengthen the stored reason.
#[derive(Debug)]
pub struct ScopeRecord {
    /// The scope's identity.
    pub id: ScopeId,
    /// The enclosing scope at creation time.
    pub parent: Option<ScopeId>,
    /// Absolute deadline, if the scope has one.
    pub deadline: Option<Time>,
    /// Set when the scope is cancelled; never cleared.
    pub cancelled: Option<CancelReason>,
    /// A shielded scope hides cancellation of its ancestors from the tasks
    /// inside it.
    pub shield: bool,
    /// Tasks whose scope stack contains this scope.
    pub members: Vec<TaskId>,
    /// Generation of the armed deadline timer, for disarming at exit.
    pub timer_generation: Option<u64>,
}

impl ScopeRecord {
    /// Creates a scope record.
    #[must_use]
    pub fn new(id: ScopeId, parent: Option<ScopeId>, deadline: Option<Time>, shield: bool) -> Self {
        Self {
            id,
            parent,
            deadline,
            cancelled: None,
            shield,
            members: Vec::new(),
            timer_generation: None,
        }
    }

    /// Marks the scope cancelled.
    ///
    /// Returns true on the first cancellation; later calls only strengthen
    /// the stored reason and return false.
    pub fn cancel(&mut self, reason: CancelReason) -> bool {
        match &mut self.cancelled {
            Some(existing) => {
                existing.strengthen(&reason);
                false
            }
            None => {
                self.cancelled = Some(reason);
                true
            }
        }
    }

    /// Adds a member task (idempotent).
    pub fn add_member(&mut self, task: TaskId) {
        if !self.members.contains(&task) {
            self.members.push(task);
        }
    }

    /// Removes a member task.
    pub fn remove_member(&mut self, task: TaskId) {
        self.members.retain(|t| *t != task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    #[test]
    fn cancel_is_monotone() {
        let mut scope = ScopeRecord::new(ScopeId::new_for_test(1, 0), None, None, false);
        assert!(scope.cancel(CancelReason::user("stop")));
        assert!(!scope.cancel(CancelReason::shutdown()));
        // Strengthened, not replaced by a weaker reason.
        assert_eq!(
            scope.cancelled.as_ref().map(CancelReason::kind),
            Some(CancelKind::Shutdown)
        );
        assert!(!scope.cancel(CancelReason::user("weaker")));
        assert_eq!(
            scope.cancelled.as_ref().map(CancelReason::kind),
            Some(CancelKind::Shutdown)
        );
    }

    #[test]
    fn membership_is_idempotent() {
        let task = TaskId::new_for_test(3, 0);
        let mut scope = ScopeRecord::new(ScopeId::new_for_test(1, 0), None, None, false);
        scope.add_member(task);
        scope.add_member(task);
        assert_eq!(scope.members.len(), 1);
        scope.remove_member(task);
        assert!(scope.members.is_empty());
    }
}
