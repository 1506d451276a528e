//! Error types and error-handling strategy.
//!
//! Errors are explicit and typed. The propagation policy is strict: an
//! operation error surfaces exactly to the task awaiting that operation's
//! promise, and the scheduler never swallows it. Cancellation and timeout
//! travel through the same `Result` machinery as ordinary errors but are
//! tagged so cleanup code can tell "being cancelled" from "failed".
//!
//! # Taxonomy
//!
//! - [`ErrorKind::AlreadySettled`]: settling or re-reading a settled
//!   promise; a programming error, never recoverable.
//! - [`ErrorKind::QueueFull`]: the ring has no free submission slot;
//!   backpressure, retry after completions are reaped.
//! - [`ErrorKind::Ring`]: a kernel completion carried a negative result
//!   code; the raw code is preserved.
//! - [`ErrorKind::Cancelled`]: injected cooperative cancellation, with a
//!   [`CancelReason`] naming the origin.
//! - [`ErrorKind::TimedOut`]: a propagate-mode scope deadline fired.
//! - [`ErrorKind::Panicked`]: a joined task panicked.
//! - [`ErrorKind::Internal`]: a runtime invariant was violated (bug).
//! - [`ErrorKind::User`]: an application-provided error.

use crate::types::{CancelReason, PanicPayload, Time};
use core::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A promise was resolved or failed after it had already settled.
    AlreadySettled,
    /// The submission queue has no free slot.
    QueueFull,
    /// A kernel completion reported a negative result code.
    Ring,
    /// The operation was cancelled cooperatively.
    Cancelled,
    /// A scope deadline fired in propagate mode.
    TimedOut,
    /// A joined task panicked.
    Panicked,
    /// A runtime invariant was violated.
    Internal,
    /// An application-provided error.
    User,
}

/// Coarse grouping of error kinds, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Promise settlement misuse.
    Settle,
    /// Submission backpressure.
    Backpressure,
    /// Kernel-reported operation failure.
    Kernel,
    /// Cooperative cancellation and deadlines.
    Cancellation,
    /// Runtime bugs.
    Internal,
    /// Application errors.
    User,
}

/// Whether retrying the failed operation can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary condition; retrying is reasonable.
    Transient,
    /// Retrying cannot help.
    Permanent,
    /// Depends on context the runtime cannot see.
    Unknown,
}

impl ErrorKind {
    /// Returns the category for this kind.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::AlreadySettled => ErrorCategory::Settle,
            Self::QueueFull => ErrorCategory::Backpressure,
            Self::Ring => ErrorCategory::Kernel,
            Self::Cancelled | Self::TimedOut => ErrorCategory::Cancellation,
            Self::Panicked | Self::Internal => ErrorCategory::Internal,
            Self::User => ErrorCategory::User,
        }
    }

    /// Returns the recoverability classification for this kind.
    #[must_use]
    pub const fn recoverability(self) -> Recoverability {
        match self {
            Self::QueueFull => Recoverability::Transient,
            Self::AlreadySettled | Self::Cancelled | Self::TimedOut | Self::Panicked
            | Self::Internal => Recoverability::Permanent,
            Self::Ring | Self::User => Recoverability::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySettled => write!(f, "promise already settled"),
            Self::QueueFull => write!(f, "submission queue full"),
            Self::Ring => write!(f, "ring operation failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Panicked => write!(f, "task panicked"),
            Self::Internal => write!(f, "internal runtime error"),
            Self::User => write!(f, "application error"),
        }
    }
}

/// The error type for all runtime operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<&'static str>,
    reason: Option<CancelReason>,
    code: Option<i32>,
    deadline: Option<Time>,
    panic: Option<PanicPayload>,
}

impl Error {
    const fn bare(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            reason: None,
            code: None,
            deadline: None,
            panic: None,
        }
    }

    /// A promise was settled twice (or its result taken twice).
    #[must_use]
    pub const fn already_settled() -> Self {
        Self::bare(ErrorKind::AlreadySettled)
    }

    /// The ring's submission queue is full.
    #[must_use]
    pub const fn queue_full() -> Self {
        Self::bare(ErrorKind::QueueFull)
    }

    /// A kernel completion carried the raw negative result `code`.
    #[must_use]
    pub const fn ring(code: i32) -> Self {
        let mut err = Self::bare(ErrorKind::Ring);
        err.code = Some(code);
        err
    }

    /// Wraps a synchronous OS error in the same shape as a ring error.
    #[must_use]
    pub fn from_io(err: &std::io::Error) -> Self {
        Self::ring(-err.raw_os_error().unwrap_or(5))
    }

    /// Cooperative cancellation with the given reason.
    #[must_use]
    pub const fn cancelled(reason: CancelReason) -> Self {
        let mut err = Self::bare(ErrorKind::Cancelled);
        err.reason = Some(reason);
        err
    }

    /// A propagate-mode scope deadline fired.
    #[must_use]
    pub const fn timed_out(deadline: Time) -> Self {
        let mut err = Self::bare(ErrorKind::TimedOut);
        err.deadline = Some(deadline);
        err
    }

    /// A joined task panicked.
    #[must_use]
    pub fn panicked(payload: PanicPayload) -> Self {
        let mut err = Self::bare(ErrorKind::Panicked);
        err.panic = Some(payload);
        err
    }

    /// A runtime invariant was violated.
    #[must_use]
    pub const fn internal(message: &'static str) -> Self {
        let mut err = Self::bare(ErrorKind::Internal);
        err.message = Some(message);
        err
    }

    /// An application error with a static message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        let mut err = Self::bare(ErrorKind::User);
        err.message = Some(message);
        err
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability of this error.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is injected cancellation. A
    /// propagate-mode timeout is reported as `TimedOut`, not as
    /// cancellation: the scope that owned the deadline already consumed
    /// the injected signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this is submission backpressure.
    #[must_use]
    pub const fn is_queue_full(&self) -> bool {
        matches!(self.kind, ErrorKind::QueueFull)
    }

    /// Returns true if this is a propagate-mode deadline error.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self.kind, ErrorKind::TimedOut)
    }

    /// Returns the cancellation reason, if this is a cancellation error.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        self.reason.as_ref()
    }

    /// Returns the raw kernel result code, if this is a ring error.
    #[must_use]
    pub const fn ring_code(&self) -> Option<i32> {
        self.code
    }

    /// Returns the panic payload, if a joined task panicked.
    #[must_use]
    pub const fn panic_payload(&self) -> Option<&PanicPayload> {
        self.panic.as_ref()
    }

    /// Converts a ring error into `std::io::Error` (errno semantics).
    #[must_use]
    pub fn as_io_error(&self) -> Option<std::io::Error> {
        self.code.map(|c| std::io::Error::from_raw_os_error(-c))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = self.code {
            write!(f, " (os error {})", -code)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        if let Some(deadline) = self.deadline {
            write!(f, " (deadline {deadline})")?;
        }
        if let Some(panic) = &self.panic {
            write!(f, " ({panic})")?;
        }
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScopeId;

    #[test]
    fn categories() {
        assert_eq!(Error::already_settled().category(), ErrorCategory::Settle);
        assert_eq!(Error::queue_full().category(), ErrorCategory::Backpressure);
        assert_eq!(Error::ring(-5).category(), ErrorCategory::Kernel);
        assert_eq!(
            Error::cancelled(CancelReason::default()).category(),
            ErrorCategory::Cancellation
        );
        assert_eq!(
            Error::timed_out(Time::ZERO).category(),
            ErrorCategory::Cancellation
        );
    }

    #[test]
    fn queue_full_is_transient() {
        assert_eq!(
            Error::queue_full().recoverability(),
            Recoverability::Transient
        );
        assert_eq!(
            Error::already_settled().recoverability(),
            Recoverability::Permanent
        );
    }

    #[test]
    fn cancellation_predicates() {
        let scope = ScopeId::new_for_test(1, 0);
        let err = Error::cancelled(CancelReason::deadline(scope));
        assert!(err.is_cancelled());
        assert!(!err.is_timed_out());
        assert_eq!(err.cancel_reason().and_then(CancelReason::origin), Some(scope));
    }

    #[test]
    fn ring_error_keeps_raw_code() {
        let err = Error::ring(-2);
        assert_eq!(err.ring_code(), Some(-2));
        let io = err.as_io_error().expect("ring error converts");
        assert_eq!(io.raw_os_error(), Some(2));
    }
}
