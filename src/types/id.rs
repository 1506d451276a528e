//! Identifier and timestamp types for runtime entities.
//!
//! Identifiers wrap arena indices: they are cheap to copy, generation-safe,
//! and only the runtime state can mint them.

use crate::util::ArenaIndex;
use core::fmt;
use std::ops::Add;
use std::time::Duration;

/// A unique identifier for a task.
///
/// A task drives exactly one suspendable computation to completion.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) ArenaIndex);

impl TaskId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Creates a task ID for tests that don't care about specific values.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0.slot())
    }
}

/// A unique identifier for a cancellation scope.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub(crate) ArenaIndex);

impl ScopeId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Creates a scope ID for tests that don't care about specific values.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0.slot())
    }
}

/// A runtime timestamp in nanoseconds.
///
/// With a wall clock this is time since runtime start; in lab mode it is
/// virtual time advanced by the scheduler.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The zero instant (runtime start).
    pub const ZERO: Self = Self(0);

    /// The maximum representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a time from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the time as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as milliseconds (truncated).
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Adds nanoseconds, saturating on overflow.
    #[must_use]
    pub const fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the duration from `earlier` to `self`, or zero if `self` is
    /// not later.
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add_nanos(u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(
                f,
                "{}.{:03}s",
                self.0 / 1_000_000_000,
                (self.0 / 1_000_000) % 1000
            )
        } else if self.0 >= 1_000_000 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_conversions() {
        assert_eq!(Time::from_secs(2).as_nanos(), 2_000_000_000);
        assert_eq!(Time::from_millis(3).as_nanos(), 3_000_000);
        assert_eq!(Time::from_nanos(1_500_000_000).as_millis(), 1500);
    }

    #[test]
    fn time_add_duration() {
        let t = Time::from_secs(1) + Duration::from_millis(500);
        assert_eq!(t.as_millis(), 1500);
        assert_eq!(Time::MAX + Duration::from_secs(1), Time::MAX);
    }

    #[test]
    fn duration_since_saturates() {
        let early = Time::from_secs(1);
        let late = Time::from_secs(3);
        assert_eq!(late.duration_since(early), Duration::from_secs(2));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }
}
