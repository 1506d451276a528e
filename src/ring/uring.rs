//! io_uring-backed ring (Linux only, feature-gated).
//!
//! Submissions are pushed eagerly (one `io_uring_enter` per submit) and
//! completions are reaped in kernel delivery order. The in-flight table is
//! a generation-indexed arena; the packed arena index is the correlation
//! token, so tokens are unique among live operations and safe to reuse.
//!
//! The table owns every resource the kernel may touch while an operation is
//! in flight (read/write buffers, path strings). Resources are released
//! when the completion is reaped, never earlier, so an abandoned operation
//! cannot leave the kernel writing into freed memory.
//!
//! NOTE: This module uses unsafe to push SQEs. The safety invariants are
//! documented inline.

#[cfg(all(target_os = "linux", feature = "io-uring"))]
mod imp {
    #![allow(unsafe_code)]

    use crate::ring::op::{Op, OpKind};
    use crate::ring::{Completion, Ring, SubmitError, Token};
    use crate::util::{Arena, ArenaIndex};
    use io_uring::{opcode, squeue, types, IoUring};
    use std::ffi::CString;
    use std::io;
    use std::ptr;
    use std::time::Duration;

    const DEFAULT_ENTRIES: u32 = 256;
    /// User data for async-cancel SQEs; their completions carry no token.
    /// A packed arena index only reaches this value after 2^32 slots.
    const CANCEL_USER_DATA: u64 = u64::MAX;

    /// Resources pinned while an operation is in flight.
    struct Inflight {
        kind: OpKind,
        buf: Option<Vec<u8>>,
        _path: Option<CString>,
    }

    /// io_uring-backed ring.
    pub struct UringRing {
        ring: IoUring,
        inflight: Arena<Inflight>,
    }

    impl UringRing {
        /// Creates a ring with the default submission queue depth.
        ///
        /// # Errors
        ///
        /// Propagates `io_uring_setup` failures.
        pub fn new() -> io::Result<Self> {
            Self::with_entries(DEFAULT_ENTRIES)
        }

        /// Creates a ring with `entries` submission slots.
        ///
        /// # Errors
        ///
        /// Propagates `io_uring_setup` failures.
        pub fn with_entries(entries: u32) -> io::Result<Self> {
            Ok(Self {
                ring: IoUring::new(entries)?,
                inflight: Arena::new(),
            })
        }

        fn push_and_submit(&mut self, entry: &squeue::Entry) -> Result<(), SubmitError> {
            // SAFETY: every pointer baked into `entry` targets heap storage
            // owned by an `Inflight` record that stays in the arena until
            // the matching completion is reaped.
            let pushed = unsafe { self.ring.submission().push(entry) };
            if pushed.is_err() {
                return Err(SubmitError::QueueFull);
            }
            self.ring.submit().map_err(SubmitError::Io)?;
            Ok(())
        }
    }

    impl std::fmt::Debug for UringRing {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("UringRing")
                .field("in_flight", &self.inflight.len())
                .finish_non_exhaustive()
        }
    }

    impl Ring for UringRing {
        fn submit(&mut self, op: Op) -> Result<Token, SubmitError> {
            let kind = op.kind();
            let (record, entry_builder): (Inflight, Box<dyn FnOnce(u64) -> squeue::Entry>) =
                match op {
                    Op::Nop => (
                        Inflight {
                            kind,
                            buf: None,
                            _path: None,
                        },
                        Box::new(|ud| opcode::Nop::new().build().user_data(ud)),
                    ),
                    Op::OpenAt { path, flags, mode } => {
                        let ptr = path.as_ptr();
                        (
                            Inflight {
                                kind,
                                buf: None,
                                _path: Some(path),
                            },
                            Box::new(move |ud| {
                                opcode::OpenAt::new(types::Fd(libc::AT_FDCWD), ptr)
                                    .flags(flags)
                                    .mode(mode)
                                    .build()
                                    .user_data(ud)
                            }),
                        )
                    }
                    Op::ReadAt { fd, len, offset } => {
                        let mut buf = vec![0u8; len];
                        let ptr = buf.as_mut_ptr();
                        let n = u32::try_from(len).unwrap_or(u32::MAX);
                        (
                            Inflight {
                                kind,
                                buf: Some(buf),
                                _path: None,
                            },
                            Box::new(move |ud| {
                                opcode::Read::new(types::Fd(fd), ptr, n)
                                    .offset(offset)
                                    .build()
                                    .user_data(ud)
                            }),
                        )
                    }
                    Op::WriteAt { fd, buf, offset } => {
                        let ptr = buf.as_ptr();
                        let n = u32::try_from(buf.len()).unwrap_or(u32::MAX);
                        (
                            Inflight {
                                kind,
                                buf: Some(buf),
                                _path: None,
                            },
                            Box::new(move |ud| {
                                opcode::Write::new(types::Fd(fd), ptr, n)
                                    .offset(offset)
                                    .build()
                                    .user_data(ud)
                            }),
                        )
                    }
                    Op::Fsync { fd } => (
                        Inflight {
                            kind,
                            buf: None,
                            _path: None,
                        },
                        Box::new(move |ud| {
                            opcode::Fsync::new(types::Fd(fd)).build().user_data(ud)
                        }),
                    ),
                    Op::Close { fd } => (
                        Inflight {
                            kind,
                            buf: None,
                            _path: None,
                        },
                        Box::new(move |ud| {
                            opcode::Close::new(types::Fd(fd)).build().user_data(ud)
                        }),
                    ),
                    Op::Accept { fd } => (
                        Inflight {
                            kind,
                            buf: None,
                            _path: None,
                        },
                        Box::new(move |ud| {
                            opcode::Accept::new(types::Fd(fd), ptr::null_mut(), ptr::null_mut())
                                .build()
                                .user_data(ud)
                        }),
                    ),
                    Op::Recv { fd, len } => {
                        let mut buf = vec![0u8; len];
                        let ptr = buf.as_mut_ptr();
                        let n = u32::try_from(len).unwrap_or(u32::MAX);
                        (
                            Inflight {
                                kind,
                                buf: Some(buf),
                                _path: None,
                            },
                            Box::new(move |ud| {
                                opcode::Recv::new(types::Fd(fd), ptr, n)
                                    .build()
                                    .user_data(ud)
                            }),
                        )
                    }
                    Op::Send { fd, buf } => {
                        let ptr = buf.as_ptr();
                        let n = u32::try_from(buf.len()).unwrap_or(u32::MAX);
                        (
                            Inflight {
                                kind,
                                buf: Some(buf),
                                _path: None,
                            },
                            Box::new(move |ud| {
                                opcode::Send::new(types::Fd(fd), ptr, n)
                                    .build()
                                    .user_data(ud)
                            }),
                        )
                    }
                };

            let index = self.inflight.insert(record);
            let token = Token::from_raw(index.pack());
            let entry = entry_builder(token.as_raw());
            if let Err(err) = self.push_and_submit(&entry) {
                self.inflight.remove(index);
                return Err(err);
            }
            Ok(token)
        }

        fn drain(&mut self, out: &mut Vec<Completion>) -> io::Result<usize> {
            let mut reaped = Vec::new();
            for cqe in self.ring.completion() {
                reaped.push((cqe.user_data(), cqe.result()));
            }

            let mut n = 0;
            for (user_data, result) in reaped {
                if user_data == CANCEL_USER_DATA {
                    continue;
                }
                let index = ArenaIndex::unpack(user_data);
                let Some(record) = self.inflight.remove(index) else {
                    // Stale user_data; nothing to release.
                    continue;
                };
                let payload = match record.kind {
                    OpKind::ReadAt | OpKind::Recv if result >= 0 => {
                        record.buf.map(|mut buf| {
                            buf.truncate(result as usize);
                            buf
                        })
                    }
                    _ => None,
                };
                out.push(Completion {
                    token: Token::from_raw(user_data),
                    result,
                    payload,
                });
                n += 1;
            }
            Ok(n)
        }

        fn wait(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            match timeout {
                None => {
                    self.ring.submitter().submit_and_wait(1)?;
                }
                Some(t) if t.is_zero() => {
                    self.ring.submitter().submit()?;
                }
                Some(t) => {
                    let ts = types::Timespec::new()
                        .sec(t.as_secs())
                        .nsec(t.subsec_nanos());
                    let args = types::SubmitArgs::new().timespec(&ts);
                    match self.ring.submitter().submit_with_args(1, &args) {
                        Ok(_) => {}
                        // Timeout elapsing is a normal wake-up.
                        Err(err) if err.raw_os_error() == Some(libc::ETIME) => {}
                        Err(err) => return Err(err),
                    }
                }
            }
            Ok(())
        }

        fn cancel(&mut self, token: Token) -> io::Result<()> {
            if !self.inflight.contains(ArenaIndex::unpack(token.as_raw())) {
                return Ok(());
            }
            let entry = opcode::AsyncCancel::new(token.as_raw())
                .build()
                .user_data(CANCEL_USER_DATA);
            // Best-effort: a full queue just means the op completes normally.
            match self.push_and_submit(&entry) {
                Ok(()) | Err(SubmitError::QueueFull) => Ok(()),
                Err(SubmitError::Io(err)) => Err(err),
                Err(SubmitError::Unsupported(_)) => Ok(()),
            }
        }

        fn in_flight(&self) -> usize {
            self.inflight.len()
        }
    }
}

#[cfg(all(target_os = "linux", feature = "io-uring"))]
pub use imp::UringRing;

#[cfg(not(all(target_os = "linux", feature = "io-uring")))]
mod imp {
    use crate::ring::op::Op;
    use crate::ring::{Completion, Ring, SubmitError, Token};
    use std::io;
    use std::time::Duration;

    const UNAVAILABLE: &str = "UringRing requires linux and the io-uring feature";

    /// Stub uring ring for non-Linux targets or when the feature is off.
    #[derive(Debug, Default)]
    pub struct UringRing;

    impl UringRing {
        /// Always fails on this platform/configuration.
        ///
        /// # Errors
        ///
        /// Always returns [`io::ErrorKind::Unsupported`].
        pub fn new() -> io::Result<Self> {
            Err(io::Error::new(io::ErrorKind::Unsupported, UNAVAILABLE))
        }

        /// Always fails on this platform/configuration.
        ///
        /// # Errors
        ///
        /// Always returns [`io::ErrorKind::Unsupported`].
        pub fn with_entries(_entries: u32) -> io::Result<Self> {
            Self::new()
        }
    }

    impl Ring for UringRing {
        fn submit(&mut self, _op: Op) -> Result<Token, SubmitError> {
            Err(SubmitError::Unsupported(UNAVAILABLE))
        }

        fn drain(&mut self, _out: &mut Vec<Completion>) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Unsupported, UNAVAILABLE))
        }

        fn wait(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, UNAVAILABLE))
        }

        fn cancel(&mut self, _token: Token) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, UNAVAILABLE))
        }

        fn in_flight(&self) -> usize {
            0
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "io-uring")))]
pub use imp::UringRing;
