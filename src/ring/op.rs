//! Operation descriptors submitted to a ring backend.
//!
//! Descriptors are plain data: the backend turns them into submission
//! entries and keeps whatever resources they reference (buffers, paths)
//! alive until the matching completion is reaped. Socket and file *setup*
//! (bind, listen, connect) is synchronous and goes through `std`; only the
//! operations that actually block go through the ring.

use core::fmt;
use std::ffi::CString;

/// A file descriptor as carried in operation descriptors.
///
/// Lab-ring descriptors use synthetic values that never touch the OS.
pub type Fd = i32;

/// Open flags for [`Op::OpenAt`] (Linux ABI values; the lab ring honors
/// the same bits).
pub mod open_flags {
    /// Read-only.
    pub const RDONLY: i32 = 0;
    /// Write-only.
    pub const WRONLY: i32 = 1;
    /// Read-write.
    pub const RDWR: i32 = 2;
    /// Create if missing.
    pub const CREAT: i32 = 0o100;
    /// Truncate on open.
    pub const TRUNC: i32 = 0o1000;
    /// Append on write.
    pub const APPEND: i32 = 0o2000;
}

/// An operation to submit.
#[derive(Debug)]
pub enum Op {
    /// No-op; completes with result 0. Useful for ring liveness checks.
    Nop,
    /// Opens the file at `path`. Completes with the new fd.
    OpenAt {
        /// Absolute or CWD-relative path.
        path: CString,
        /// Open flags (`O_RDONLY`, `O_WRONLY | O_CREAT`, ...).
        flags: i32,
        /// Permission bits applied when creating.
        mode: u32,
    },
    /// Reads up to `len` bytes at `offset`. Completes with the byte count
    /// and the filled buffer as payload.
    ReadAt {
        /// Source descriptor.
        fd: Fd,
        /// Maximum number of bytes to read.
        len: usize,
        /// Absolute file offset.
        offset: u64,
    },
    /// Writes `buf` at `offset`. Completes with the byte count.
    WriteAt {
        /// Destination descriptor.
        fd: Fd,
        /// Bytes to write; owned by the backend while in flight.
        buf: Vec<u8>,
        /// Absolute file offset.
        offset: u64,
    },
    /// Flushes file data and metadata to stable storage.
    Fsync {
        /// Descriptor to flush.
        fd: Fd,
    },
    /// Closes a descriptor.
    Close {
        /// Descriptor to close.
        fd: Fd,
    },
    /// Accepts a connection on a listening socket. Completes with the
    /// accepted fd.
    Accept {
        /// Listening descriptor.
        fd: Fd,
    },
    /// Receives up to `len` bytes from a socket. Completes with the byte
    /// count (0 = peer closed) and the filled buffer as payload.
    Recv {
        /// Connected descriptor.
        fd: Fd,
        /// Maximum number of bytes to receive.
        len: usize,
    },
    /// Sends `buf` on a socket. Completes with the byte count.
    Send {
        /// Connected descriptor.
        fd: Fd,
        /// Bytes to send; owned by the backend while in flight.
        buf: Vec<u8>,
    },
}

impl Op {
    /// Returns the kind of this operation.
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        match self {
            Self::Nop => OpKind::Nop,
            Self::OpenAt { .. } => OpKind::OpenAt,
            Self::ReadAt { .. } => OpKind::ReadAt,
            Self::WriteAt { .. } => OpKind::WriteAt,
            Self::Fsync { .. } => OpKind::Fsync,
            Self::Close { .. } => OpKind::Close,
            Self::Accept { .. } => OpKind::Accept,
            Self::Recv { .. } => OpKind::Recv,
            Self::Send { .. } => OpKind::Send,
        }
    }
}

/// Discriminant-only view of [`Op`], for logging and lab inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum OpKind {
    Nop,
    OpenAt,
    ReadAt,
    WriteAt,
    Fsync,
    Close,
    Accept,
    Recv,
    Send,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nop => "nop",
            Self::OpenAt => "openat",
            Self::ReadAt => "read",
            Self::WriteAt => "write",
            Self::Fsync => "fsync",
            Self::Close => "close",
            Self::Accept => "accept",
            Self::Recv => "recv",
            Self::Send => "send",
        };
        f.write_str(name)
    }
}
