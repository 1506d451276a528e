//! Internal records for tasks and scopes.

pub mod scope;
pub mod task;

pub use scope::ScopeRecord;
pub use task::{TaskOutcome, TaskRecord, TaskState};
