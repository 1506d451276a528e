//! Asynchronous file operations over ring submissions.
//!
//! Open, read, write, fsync and close all go through the ring; only path
//! validation happens synchronously. Against the lab ring these operate on
//! in-memory fixtures, so the API is identical in tests and production.

use crate::error::{Error, Result};
use crate::ring::op::{open_flags, Fd, Op};
use crate::runtime::io_op::submit;
use crate::runtime::local;
use crate::tracing_compat::{debug, warn};
use std::ffi::CString;
use std::path::Path;

const READ_CHUNK: usize = 16 * 1024;

/// An open file.
#[derive(Debug)]
pub struct File {
    fd: Fd,
    closed: bool,
}

fn path_cstring(path: &Path) -> Result<CString> {
    let utf8 = path.to_str().ok_or_else(|| Error::user("path is not valid UTF-8"))?;
    CString::new(utf8).map_err(|_| Error::user("path contains an interior NUL byte"))
}

impl File {
    /// Opens an existing file read-only.
    ///
    /// # Errors
    ///
    /// Ring errors (such as `ENOENT`) and cancellation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), open_flags::RDONLY, 0).await
    }

    /// Creates (or truncates) a file for writing.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(
            path.as_ref(),
            open_flags::WRONLY | open_flags::CREAT | open_flags::TRUNC,
            0o644,
        )
        .await
    }

    /// Opens a file with explicit flags and mode.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn open_with(path: &Path, flags: i32, mode: u32) -> Result<Self> {
        let path = path_cstring(path)?;
        let output = submit(Op::OpenAt { path, flags, mode }).await?;
        debug!(fd = output.result, "file opened");
        Ok(Self {
            fd: output.result,
            closed: false,
        })
    }

    /// Returns the underlying descriptor.
    #[must_use]
    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Reads up to `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let output = submit(Op::ReadAt {
            fd: self.fd,
            len,
            offset,
        })
        .await?;
        Ok(output.payload.unwrap_or_default())
    }

    /// Reads from `offset` to the end of the file.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        loop {
            let offset = u64::try_from(contents.len()).unwrap_or(u64::MAX);
            let chunk = self.read_at(offset, READ_CHUNK).await?;
            let done = chunk.len() < READ_CHUNK;
            contents.extend_from_slice(&chunk);
            if done {
                return Ok(contents);
            }
        }
    }

    /// Writes `data` at `offset`, returning the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let output = submit(Op::WriteAt {
            fd: self.fd,
            buf: data.to_vec(),
            offset,
        })
        .await?;
        Ok(usize::try_from(output.result).unwrap_or(0))
    }

    /// Writes all of `data` at `offset`, retrying short writes.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn write_all_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self
                .write_at(offset + written as u64, &data[written..])
                .await?;
            if n == 0 {
                return Err(Error::user("write returned zero bytes"));
            }
            written += n;
        }
        Ok(())
    }

    /// Flushes file data and metadata to stable storage.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn sync_all(&self) -> Result<()> {
        submit(Op::Fsync { fd: self.fd }).await?;
        Ok(())
    }

    /// Closes the file, reporting any close error.
    ///
    /// # Errors
    ///
    /// Ring errors and cancellation.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        submit(Op::Close { fd: self.fd }).await?;
        Ok(())
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Fire-and-forget close; the completion is discarded on arrival.
        let fd = self.fd;
        let submitted =
            local::with_state(|state| state.submit_op(Op::Close { fd }).is_ok());
        if submitted != Some(true) {
            warn!(fd, "file descriptor leaked: close could not be submitted");
        }
    }
}
