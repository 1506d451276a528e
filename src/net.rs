//! Asynchronous TCP primitives over ring submissions.
//!
//! Socket *setup* (bind, connect) is synchronous through `std::net`; the
//! operations that actually wait (accept, recv, send, close) go through
//! the ring. Lab-ring sockets are synthetic descriptors created with
//! [`TcpListener::from_lab`] / [`TcpStream::from_lab`] and driven by
//! [`LabHandle`](crate::ring::LabHandle) fixtures.

use crate::error::{Error, Result};
use crate::ring::op::{Fd, Op};
use crate::runtime::io_op::submit;
use crate::runtime::local;
use crate::tracing_compat::{debug, warn};
use std::net::ToSocketAddrs;

/// A listening TCP socket.
#[derive(Debug)]
pub struct TcpListener {
    fd: Fd,
    /// Keeps a real socket open (and closes it on drop). `None` for
    /// lab-ring descriptors.
    owned: Option<std::net::TcpListener>,
}

impl TcpListener {
    /// Binds a real socket (synchronous setup).
    ///
    /// # Errors
    ///
    /// OS bind errors, wrapped as ring-shaped errors.
    #[cfg(unix)]
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        use std::os::fd::AsRawFd;

        let listener = std::net::TcpListener::bind(addr).map_err(|e| Error::from_io(&e))?;
        let fd = listener.as_raw_fd();
        debug!(fd, "listener bound");
        Ok(Self {
            fd,
            owned: Some(listener),
        })
    }

    /// Binding real sockets is unsupported off Unix.
    ///
    /// # Errors
    ///
    /// Always.
    #[cfg(not(unix))]
    pub fn bind(_addr: impl ToSocketAddrs) -> Result<Self> {
        Err(Error::internal("real sockets require a Unix platform"))
    }

    /// Wraps a lab-ring listener descriptor.
    #[must_use]
    pub fn from_lab(fd: Fd) -> Self {
        Self { fd, owned: None }
    }

    /// Returns the underlying descriptor.
    #[must_use]
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Accepts one connection.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn accept(&self) -> Result<TcpStream> {
        let output = submit(Op::Accept { fd: self.fd }).await?;
        debug!(listener = self.fd, fd = output.result, "connection accepted");
        Ok(TcpStream {
            fd: output.result,
            owned: None,
            closed: false,
        })
    }
}

/// A connected TCP socket.
#[derive(Debug)]
pub struct TcpStream {
    fd: Fd,
    owned: Option<std::net::TcpStream>,
    closed: bool,
}

impl TcpStream {
    /// Connects a real socket (synchronous setup).
    ///
    /// # Errors
    ///
    /// OS connect errors, wrapped as ring-shaped errors.
    #[cfg(unix)]
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        use std::os::fd::AsRawFd;

        let stream = std::net::TcpStream::connect(addr).map_err(|e| Error::from_io(&e))?;
        let fd = stream.as_raw_fd();
        Ok(Self {
            fd,
            owned: Some(stream),
            closed: false,
        })
    }

    /// Connecting real sockets is unsupported off Unix.
    ///
    /// # Errors
    ///
    /// Always.
    #[cfg(not(unix))]
    pub fn connect(_addr: impl ToSocketAddrs) -> Result<Self> {
        Err(Error::internal("real sockets require a Unix platform"))
    }

    /// Wraps a lab-ring socket descriptor.
    #[must_use]
    pub fn from_lab(fd: Fd) -> Self {
        Self {
            fd,
            owned: None,
            closed: false,
        }
    }

    /// Returns the underlying descriptor.
    #[must_use]
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Receives up to `len` bytes. An empty result means the peer closed.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn recv(&self, len: usize) -> Result<Vec<u8>> {
        let output = submit(Op::Recv { fd: self.fd, len }).await?;
        Ok(output.payload.unwrap_or_default())
    }

    /// Sends `data`, returning the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn send(&self, data: &[u8]) -> Result<usize> {
        let output = submit(Op::Send {
            fd: self.fd,
            buf: data.to_vec(),
        })
        .await?;
        Ok(usize::try_from(output.result).unwrap_or(0))
    }

    /// Sends all of `data`, retrying short sends.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn send_all(&self, data: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < data.len() {
            let n = self.send(&data[sent..]).await?;
            if n == 0 {
                return Err(Error::user("send returned zero bytes"));
            }
            sent += n;
        }
        Ok(())
    }

    /// Closes the socket through the ring.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        if self.owned.take().is_some() {
            // Real socket: std closes the fd on drop.
            return Ok(());
        }
        submit(Op::Close { fd: self.fd }).await?;
        Ok(())
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        if self.closed || self.owned.is_some() {
            return;
        }
        let fd = self.fd;
        let submitted =
            local::with_state(|state| state.submit_op(Op::Close { fd }).is_ok());
        if submitted != Some(true) {
            warn!(fd, "socket descriptor leaked: close could not be submitted");
        }
    }
}
