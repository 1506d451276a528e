//! Task table: records plus stored futures.

use crate::record::TaskRecord;
use crate::runtime::stored_task::StoredTask;
use crate::types::TaskId;
use crate::util::{Arena, ArenaIndex};
use std::collections::HashMap;

/// Owns every live task's record and future.
///
/// Futures are kept separately from records so the scheduler can lift a
/// future out, release the state borrow, poll it, and put it back; the
/// record stays addressable the whole time.
#[derive(Debug, Default)]
pub struct TaskTable {
    records: Arena<TaskRecord>,
    futures: HashMap<TaskId, StoredTask>,
}

impl TaskTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, assigning its ID.
    ///
    /// The record is built with a placeholder ID and patched once the arena
    /// slot (and therefore the real ID) is known.
    pub fn insert(&mut self, make: impl FnOnce(TaskId) -> TaskRecord) -> TaskId {
        let placeholder = TaskId::from_arena(ArenaIndex::new(0, 0));
        let index = self.records.insert(make(placeholder));
        let id = TaskId::from_arena(index);
        if let Some(record) = self.records.get_mut(index) {
            record.id = id;
        }
        id
    }

    /// Returns a task record.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.records.get(id.arena_index())
    }

    /// Returns a mutable task record.
    #[must_use]
    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.records.get_mut(id.arena_index())
    }

    /// Stores a task's future.
    pub fn store_future(&mut self, id: TaskId, task: StoredTask) {
        self.futures.insert(id, task);
    }

    /// Lifts a task's future out for polling.
    pub fn take_future(&mut self, id: TaskId) -> Option<StoredTask> {
        self.futures.remove(&id)
    }

    /// Removes a task entirely, returning its record.
    pub fn remove(&mut self, id: TaskId) -> Option<TaskRecord> {
        self.futures.remove(&id);
        self.records.remove(id.arena_index())
    }

    /// Returns the number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no task is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over live task IDs in slot order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.records
            .iter()
            .map(|(index, _)| TaskId::from_arena(index))
            .collect()
    }
}
