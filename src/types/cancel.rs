//! Cancellation kind and reason types.
//!
//! Cancellation is injected into a task at a suspension point as a typed
//! error, never delivered by silently dropping work. These types describe
//! why the injection happened and which scope, if any, it came from.

use crate::types::ScopeId;
use core::fmt;

/// The kind of cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// A scope's deadline fired.
    Deadline,
    /// A sibling task in the same group failed.
    SiblingFailed,
    /// An enclosing scope or the owning group was cancelled.
    Parent,
    /// The runtime is shutting down.
    Shutdown,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Deadline => write!(f, "deadline"),
            Self::SiblingFailed => write!(f, "sibling failed"),
            Self::Parent => write!(f, "parent cancelled"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Why a task is being cancelled, and which scope the cancellation
/// originated from.
///
/// The origin scope lets scope-exit combinators distinguish "my own
/// deadline fired" (absorb or report as timeout) from a cancellation that
/// belongs to an enclosing scope (always propagated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    kind: CancelKind,
    origin: Option<ScopeId>,
    message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a reason with the given kind and no origin scope.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            origin: None,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            origin: None,
            message: Some(message),
        }
    }

    /// Creates a deadline cancellation originating from `scope`.
    #[must_use]
    pub const fn deadline(scope: ScopeId) -> Self {
        Self {
            kind: CancelKind::Deadline,
            origin: Some(scope),
            message: None,
        }
    }

    /// Creates a sibling-failure cancellation originating from `scope`.
    #[must_use]
    pub const fn sibling_failed(scope: ScopeId) -> Self {
        Self {
            kind: CancelKind::SiblingFailed,
            origin: Some(scope),
            message: None,
        }
    }

    /// Creates a parent cancellation originating from `scope`.
    #[must_use]
    pub const fn parent(scope: ScopeId) -> Self {
        Self {
            kind: CancelKind::Parent,
            origin: Some(scope),
            message: None,
        }
    }

    /// Creates a shutdown cancellation reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self {
            kind: CancelKind::Shutdown,
            origin: None,
            message: None,
        }
    }

    /// Attaches an origin scope.
    #[must_use]
    pub const fn with_origin(mut self, scope: ScopeId) -> Self {
        self.origin = Some(scope);
        self
    }

    /// Returns the kind of this reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }

    /// Returns the scope the cancellation originated from, if any.
    #[must_use]
    pub const fn origin(&self) -> Option<ScopeId> {
        self.origin
    }

    /// Returns the optional static message.
    #[must_use]
    pub const fn message(&self) -> Option<&'static str> {
        self.message
    }

    /// Returns true if the cancellation came from a deadline firing.
    #[must_use]
    pub const fn is_deadline(&self) -> bool {
        matches!(self.kind, CancelKind::Deadline)
    }

    /// Strengthens this reason with another, keeping the more severe kind.
    ///
    /// Returns true if anything changed. Severity follows declaration
    /// order: `User < Deadline < SiblingFailed < Parent < Shutdown`.
    pub fn strengthen(&mut self, other: &Self) -> bool {
        if other.kind > self.kind {
            *self = other.clone();
            return true;
        }
        false
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(scope) = self.origin {
            write!(f, " ({scope})")?;
        }
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(CancelKind::User < CancelKind::Deadline);
        assert!(CancelKind::Deadline < CancelKind::SiblingFailed);
        assert!(CancelKind::SiblingFailed < CancelKind::Parent);
        assert!(CancelKind::Parent < CancelKind::Shutdown);
    }

    #[test]
    fn strengthen_takes_more_severe() {
        let scope = ScopeId::new_for_test(1, 0);
        let mut reason = CancelReason::user("stop");
        assert!(reason.strengthen(&CancelReason::deadline(scope)));
        assert_eq!(reason.kind(), CancelKind::Deadline);
        assert_eq!(reason.origin(), Some(scope));

        // Weaker or equal reasons leave the stored one alone.
        assert!(!reason.strengthen(&CancelReason::user("again")));
        assert!(!reason.strengthen(&CancelReason::deadline(scope)));
    }

    #[test]
    fn display_includes_origin() {
        let reason = CancelReason::deadline(ScopeId::new_for_test(4, 0));
        assert_eq!(reason.to_string(), "deadline (S4)");
    }
}
