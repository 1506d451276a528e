//! Deterministic in-process ring for testing.
//!
//! [`LabRing`] implements [`Ring`] without touching the OS. Operations run
//! against in-memory fixtures (files, listeners, socket byte queues) and
//! complete in submission order, so a test that submits the same operations
//! always observes the same completion sequence.
//!
//! Two delivery modes:
//!
//! - **auto** (default): every completable operation completes on the next
//!   drain. Accept and recv stay pending until a fixture makes them
//!   completable ([`LabHandle::push_incoming`], [`LabHandle::push_recv`]).
//! - **manual**: nothing completes until the test says so through
//!   [`LabHandle::complete_next`] / [`LabHandle::complete_token`], which is
//!   how completion *reordering* scenarios are scripted.
//!
//! The handle and the ring share state; the handle may be used from inside
//! tasks running on the same runtime.

use super::op::{Fd, Op, OpKind};
use super::{Completion, Ring, SubmitError, Token};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use super::op::open_flags;

// Linux errno values; the lab ring reports errors with the same convention
// as the kernel backend (negated errno in the result code).
const ENOENT: i32 = 2;
const EBADF: i32 = 9;
const ECANCELED: i32 = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Auto,
    Manual,
}

#[derive(Debug)]
struct PendingOp {
    token: Token,
    op: Op,
}

#[derive(Debug)]
enum FdState {
    File { path: String },
    Listener { backlog: VecDeque<Vec<Vec<u8>>> },
    Socket { recv: VecDeque<Vec<u8>>, eof: bool, sent: Vec<u8> },
}

#[derive(Debug)]
struct LabState {
    mode: Mode,
    capacity: usize,
    next_token: u64,
    next_fd: Fd,
    pending: VecDeque<PendingOp>,
    ready: VecDeque<Completion>,
    files: HashMap<String, Vec<u8>>,
    fds: HashMap<Fd, FdState>,
}

impl LabState {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            capacity: 1024,
            next_token: 1,
            // Synthetic descriptors start high so a leaked one is obvious.
            next_fd: 1_000_000,
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            files: HashMap::new(),
            fds: HashMap::new(),
        }
    }

    fn mint_token(&mut self) -> Token {
        let token = Token::from_raw(self.next_token);
        self.next_token += 1;
        token
    }

    fn mint_fd(&mut self, state: FdState) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.fds.insert(fd, state);
        fd
    }

    /// Read-only: would `op` complete if processed now?
    fn completable(&self, op: &Op) -> bool {
        match op {
            Op::Accept { fd } => match self.fds.get(fd) {
                Some(FdState::Listener { backlog }) => !backlog.is_empty(),
                _ => true, // completes with an error
            },
            Op::Recv { fd, .. } => match self.fds.get(fd) {
                Some(FdState::Socket { recv, eof, .. }) => !recv.is_empty() || *eof,
                _ => true,
            },
            _ => true,
        }
    }

    /// Runs `op` against the fixtures. `None` means it stays pending.
    fn try_complete(&mut self, op: &Op) -> Option<(i32, Option<Vec<u8>>)> {
        match op {
            Op::Nop => Some((0, None)),
            Op::OpenAt { path, flags, .. } => {
                let path = path.to_string_lossy().into_owned();
                if *flags & open_flags::CREAT != 0 {
                    let entry = self.files.entry(path.clone()).or_default();
                    if *flags & open_flags::TRUNC != 0 {
                        entry.clear();
                    }
                } else if !self.files.contains_key(&path) {
                    return Some((-ENOENT, None));
                }
                let fd = self.mint_fd(FdState::File { path });
                Some((fd, None))
            }
            Op::ReadAt { fd, len, offset } => {
                let Some(FdState::File { path }) = self.fds.get(fd) else {
                    return Some((-EBADF, None));
                };
                let content = self.files.get(path).map(Vec::as_slice).unwrap_or_default();
                let start = usize::try_from(*offset).unwrap_or(usize::MAX).min(content.len());
                let end = start.saturating_add(*len).min(content.len());
                let chunk = content[start..end].to_vec();
                Some((i32::try_from(chunk.len()).unwrap_or(i32::MAX), Some(chunk)))
            }
            Op::WriteAt { fd, buf, offset } => {
                let Some(FdState::File { path }) = self.fds.get(fd) else {
                    return Some((-EBADF, None));
                };
                let path = path.clone();
                let content = self.files.entry(path).or_default();
                let start = usize::try_from(*offset).unwrap_or(usize::MAX);
                if content.len() < start + buf.len() {
                    content.resize(start + buf.len(), 0);
                }
                content[start..start + buf.len()].copy_from_slice(buf);
                Some((i32::try_from(buf.len()).unwrap_or(i32::MAX), None))
            }
            Op::Fsync { fd } => {
                if self.fds.contains_key(fd) {
                    Some((0, None))
                } else {
                    Some((-EBADF, None))
                }
            }
            Op::Close { fd } => {
                if self.fds.remove(fd).is_some() {
                    Some((0, None))
                } else {
                    Some((-EBADF, None))
                }
            }
            Op::Accept { fd } => {
                let incoming = match self.fds.get_mut(fd) {
                    Some(FdState::Listener { backlog }) => backlog.pop_front()?,
                    _ => return Some((-EBADF, None)),
                };
                let sock = self.mint_fd(FdState::Socket {
                    recv: incoming.into(),
                    eof: false,
                    sent: Vec::new(),
                });
                Some((sock, None))
            }
            Op::Recv { fd, len } => {
                let Some(FdState::Socket { recv, eof, .. }) = self.fds.get_mut(fd) else {
                    return Some((-EBADF, None));
                };
                if let Some(mut chunk) = recv.pop_front() {
                    if chunk.len() > *len {
                        let rest = chunk.split_off(*len);
                        recv.push_front(rest);
                    }
                    let n = i32::try_from(chunk.len()).unwrap_or(i32::MAX);
                    Some((n, Some(chunk)))
                } else if *eof {
                    Some((0, Some(Vec::new())))
                } else {
                    None
                }
            }
            Op::Send { fd, buf } => {
                let Some(FdState::Socket { sent, .. }) = self.fds.get_mut(fd) else {
                    return Some((-EBADF, None));
                };
                sent.extend_from_slice(buf);
                Some((i32::try_from(buf.len()).unwrap_or(i32::MAX), None))
            }
        }
    }

    /// Auto mode: move every completable pending op to the ready queue,
    /// preserving submission order among the ops that complete.
    fn process_pending(&mut self) {
        let mut still_pending = VecDeque::new();
        while let Some(entry) = self.pending.pop_front() {
            match self.try_complete(&entry.op) {
                Some((result, payload)) => self.ready.push_back(Completion {
                    token: entry.token,
                    result,
                    payload,
                }),
                None => still_pending.push_back(entry),
            }
        }
        self.pending = still_pending;
    }
}

/// The deterministic test ring.
#[derive(Debug)]
pub struct LabRing {
    shared: Rc<RefCell<LabState>>,
}

/// Test-side control handle for a [`LabRing`].
#[derive(Debug, Clone)]
pub struct LabHandle {
    shared: Rc<RefCell<LabState>>,
}

impl LabRing {
    /// Creates an auto-mode lab ring and its control handle.
    #[must_use]
    pub fn auto() -> (Self, LabHandle) {
        Self::with_mode(Mode::Auto)
    }

    /// Creates a manual-mode lab ring and its control handle.
    #[must_use]
    pub fn manual() -> (Self, LabHandle) {
        Self::with_mode(Mode::Manual)
    }

    fn with_mode(mode: Mode) -> (Self, LabHandle) {
        let shared = Rc::new(RefCell::new(LabState::new(mode)));
        (
            Self {
                shared: Rc::clone(&shared),
            },
            LabHandle { shared },
        )
    }
}

impl Ring for LabRing {
    fn submit(&mut self, op: Op) -> Result<Token, SubmitError> {
        let mut state = self.shared.borrow_mut();
        if state.pending.len() >= state.capacity {
            return Err(SubmitError::QueueFull);
        }
        let token = state.mint_token();
        state.pending.push_back(PendingOp { token, op });
        Ok(token)
    }

    fn drain(&mut self, out: &mut Vec<Completion>) -> io::Result<usize> {
        let mut state = self.shared.borrow_mut();
        if state.mode == Mode::Auto {
            state.process_pending();
        }
        let n = state.ready.len();
        out.extend(state.ready.drain(..));
        Ok(n)
    }

    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let state = self.shared.borrow();
        if !state.ready.is_empty() {
            return Ok(());
        }
        if state.mode == Mode::Auto
            && state.pending.iter().any(|p| state.completable(&p.op))
        {
            return Ok(());
        }
        if timeout.is_some() {
            // The runtime advances virtual time past the deadline.
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "lab ring: no completion can ever arrive",
        ))
    }

    fn cancel(&mut self, token: Token) -> io::Result<()> {
        let mut state = self.shared.borrow_mut();
        if let Some(pos) = state.pending.iter().position(|p| p.token == token) {
            state.pending.remove(pos);
            state.ready.push_back(Completion {
                token,
                result: -ECANCELED,
                payload: None,
            });
        }
        Ok(())
    }

    fn in_flight(&self) -> usize {
        let state = self.shared.borrow();
        state.pending.len() + state.ready.len()
    }
}

impl LabHandle {
    /// Installs an in-memory file fixture.
    pub fn add_file(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.shared
            .borrow_mut()
            .files
            .insert(path.into(), contents.into());
    }

    /// Returns the current contents of an in-memory file.
    #[must_use]
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.borrow().files.get(path).cloned()
    }

    /// Creates a listening socket fixture and returns its descriptor.
    #[must_use]
    pub fn add_listener(&self) -> Fd {
        self.shared.borrow_mut().mint_fd(FdState::Listener {
            backlog: VecDeque::new(),
        })
    }

    /// Queues an incoming connection on a listener; `initial_recv` chunks
    /// become readable on the accepted socket.
    pub fn push_incoming(&self, listener: Fd, initial_recv: Vec<Vec<u8>>) {
        let mut state = self.shared.borrow_mut();
        if let Some(FdState::Listener { backlog }) = state.fds.get_mut(&listener) {
            backlog.push_back(initial_recv);
        }
    }

    /// Makes `bytes` readable on a socket descriptor.
    pub fn push_recv(&self, fd: Fd, bytes: impl Into<Vec<u8>>) {
        let mut state = self.shared.borrow_mut();
        if let Some(FdState::Socket { recv, .. }) = state.fds.get_mut(&fd) {
            recv.push_back(bytes.into());
        }
    }

    /// Marks a socket as closed by the peer; recv completes with 0 once the
    /// queued data is drained.
    pub fn mark_eof(&self, fd: Fd) {
        let mut state = self.shared.borrow_mut();
        if let Some(FdState::Socket { eof, .. }) = state.fds.get_mut(&fd) {
            *eof = true;
        }
    }

    /// Returns everything sent on a socket descriptor so far.
    #[must_use]
    pub fn sent_data(&self, fd: Fd) -> Vec<u8> {
        let state = self.shared.borrow();
        match state.fds.get(&fd) {
            Some(FdState::Socket { sent, .. }) => sent.clone(),
            _ => Vec::new(),
        }
    }

    /// Caps the number of in-flight submissions (for `QueueFull` tests).
    pub fn set_capacity(&self, capacity: usize) {
        self.shared.borrow_mut().capacity = capacity;
    }

    /// Lists in-flight operations in submission order.
    #[must_use]
    pub fn pending(&self) -> Vec<(Token, OpKind)> {
        self.shared
            .borrow()
            .pending
            .iter()
            .map(|p| (p.token, p.op.kind()))
            .collect()
    }

    /// Manual mode: completes a specific token with a raw result.
    ///
    /// Returns false if the token is not in flight.
    pub fn complete_token(
        &self,
        token: Token,
        result: i32,
        payload: Option<Vec<u8>>,
    ) -> bool {
        let mut state = self.shared.borrow_mut();
        let Some(pos) = state.pending.iter().position(|p| p.token == token) else {
            return false;
        };
        state.pending.remove(pos);
        state.ready.push_back(Completion {
            token,
            result,
            payload,
        });
        true
    }

    /// Manual mode: completes the oldest in-flight operation by running it
    /// against the fixtures (as auto mode would).
    ///
    /// Returns the completed token, or `None` if nothing was completable.
    pub fn complete_next(&self) -> Option<Token> {
        let mut state = self.shared.borrow_mut();
        let entry = state.pending.pop_front()?;
        match state.try_complete(&entry.op) {
            Some((result, payload)) => {
                state.ready.push_back(Completion {
                    token: entry.token,
                    result,
                    payload,
                });
                Some(entry.token)
            }
            None => {
                state.pending.push_front(entry);
                None
            }
        }
    }
}
