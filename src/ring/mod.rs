//! Submission/completion ring boundary.
//!
//! The scheduler core does not own a kernel interface; it talks to a
//! [`Ring`]: submit an operation descriptor, get back a correlation
//! [`Token`], and later reap a [`Completion`] carrying that token and the
//! operation's raw result code. Two backends implement the trait:
//!
//! - [`UringRing`]: io_uring (Linux, `io-uring` feature),
//! - [`LabRing`]: a deterministic in-process ring for tests.
//!
//! Backends own every resource an in-flight operation needs (buffers, path
//! strings) until the completion is reaped, so abandoning an operation on
//! the runtime side never leaves the kernel writing into freed memory.

pub mod lab;
pub mod op;
pub mod uring;

pub use lab::{LabHandle, LabRing};
pub use op::{Fd, Op, OpKind};
pub use uring::UringRing;

use crate::error::Error;
use core::fmt;
use std::io;
use std::time::Duration;

/// Correlation token for an in-flight operation.
///
/// Chosen by the ring backend at submission time; unique among all
/// currently outstanding operations. Backends may reuse a token after its
/// operation completes and is reaped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Creates a token from its raw representation.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw representation.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reaped completion.
#[derive(Debug)]
pub struct Completion {
    /// The token the operation was submitted with.
    pub token: Token,
    /// Raw result code: non-negative on success, a negated errno on failure.
    pub result: i32,
    /// Buffer handed back by the backend (filled read/recv data).
    pub payload: Option<Vec<u8>>,
}

/// Error returned by [`Ring::submit`].
#[derive(Debug)]
pub enum SubmitError {
    /// No submission slot is free; retry after reaping completions.
    QueueFull,
    /// The backend does not support this operation.
    Unsupported(&'static str),
    /// The submission itself failed at the OS level.
    Io(io::Error),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "submission queue full"),
            Self::Unsupported(what) => write!(f, "unsupported operation: {what}"),
            Self::Io(err) => write!(f, "submission failed: {err}"),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<SubmitError> for Error {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::QueueFull => Self::queue_full(),
            SubmitError::Unsupported(_) => Self::internal("unsupported ring operation"),
            // EIO stands in when the OS error carries no errno.
            SubmitError::Io(io_err) => Self::ring(-io_err.raw_os_error().unwrap_or(5)),
        }
    }
}

/// A submission/completion queue backend.
///
/// All methods take `&mut self`: the ring is owned by the runtime state and
/// driven from exactly one thread.
pub trait Ring {
    /// Submits an operation, returning its correlation token.
    ///
    /// # Errors
    ///
    /// [`SubmitError::QueueFull`] when no submission slot is free; the
    /// caller must retry or back off.
    fn submit(&mut self, op: Op) -> Result<Token, SubmitError>;

    /// Drains every currently available completion into `out`, without
    /// blocking. Returns the number of completions appended.
    ///
    /// Calling this when nothing has completed is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates backend poll failures.
    fn drain(&mut self, out: &mut Vec<Completion>) -> io::Result<usize>;

    /// Blocks until at least one completion is available or `timeout`
    /// elapses. `None` means wait indefinitely.
    ///
    /// # Errors
    ///
    /// An error of kind [`io::ErrorKind::WouldBlock`] signals that no
    /// completion can ever arrive (the runtime treats this as a deadlock);
    /// other errors are backend failures.
    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Requests best-effort asynchronous cancellation of an in-flight
    /// operation. The operation may still complete normally; the caller
    /// must be prepared to discard its completion.
    ///
    /// # Errors
    ///
    /// Propagates backend submission failures; "token not found" is not an
    /// error.
    fn cancel(&mut self, token: Token) -> io::Result<()>;

    /// Returns the number of operations submitted but not yet reaped.
    fn in_flight(&self) -> usize;
}

impl fmt::Debug for dyn Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
