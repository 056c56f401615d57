//! User-facing file handle.
//!
//! A [`VfsFile`] wraps the stream a backend returned from an open, pins its
//! mount through the mount token, and optionally buffers reads or writes.
//! Handles are unidirectional: a handle opened for reading rejects writes
//! and vice versa.

use std::fmt;
use std::sync::Arc;

use crate::error::{VfsError, VfsErrorKind, VfsResult};
use crate::io::Io;
use crate::mount::MountToken;

pub struct VfsFile {
    io: Box<dyn Io>,
    for_reading: bool,
    token: Arc<MountToken>,
    buffer: Vec<u8>,
    buffill: usize,
    bufpos: usize,
}

impl fmt::Debug for VfsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsFile")
            .field("for_reading", &self.for_reading)
            .field("buffill", &self.buffill)
            .field("bufpos", &self.bufpos)
            .finish()
    }
}

impl VfsFile {
    pub(crate) fn new(io: Box<dyn Io>, for_reading: bool, token: Arc<MountToken>) -> Self {
        Self {
            io,
            for_reading,
            token,
            buffer: Vec::new(),
            buffill: 0,
            bufpos: 0,
        }
    }

    /// Unbuffered clone over a duplicated stream; used by the pass-through
    /// stream a mounted handle exposes.
    pub(crate) fn duplicate_unbuffered(&self) -> VfsResult<VfsFile> {
        Ok(VfsFile::new(
            self.io.duplicate()?,
            self.for_reading,
            self.token.clone(),
        ))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        if !self.for_reading {
            return Err(VfsError::new(VfsErrorKind::OpenForWriting, "file.read"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffer.is_empty() {
            return self.io.read(buf);
        }

        let mut total = 0;
        while total < buf.len() {
            let avail = self.buffill - self.bufpos;
            if avail > 0 {
                let n = (buf.len() - total).min(avail);
                buf[total..total + n].copy_from_slice(&self.buffer[self.bufpos..self.bufpos + n]);
                self.bufpos += n;
                total += n;
            } else {
                self.bufpos = 0;
                self.buffill = 0;
                match self.io.read(&mut self.buffer[..]) {
                    Ok(0) => break,
                    Ok(n) => self.buffill = n,
                    Err(err) => {
                        if total == 0 {
                            return Err(err);
                        }
                        break;
                    }
                }
            }
        }
        Ok(total)
    }

    pub fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        if self.for_reading {
            return Err(VfsError::new(VfsErrorKind::OpenForReading, "file.write"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffer.is_empty() {
            return self.io.write(buf);
        }

        // Coalesce while it fits; otherwise flush and write through.
        if self.buffill + buf.len() < self.buffer.len() {
            self.buffer[self.buffill..self.buffill + buf.len()].copy_from_slice(buf);
            self.buffill += buf.len();
            return Ok(buf.len());
        }
        self.flush()?;
        self.io.write(buf)
    }

    /// Drain the user-level write buffer into the underlying stream. A no-op
    /// for read handles and empty buffers.
    pub fn flush(&mut self) -> VfsResult<()> {
        if self.for_reading || self.bufpos == self.buffill {
            return Ok(());
        }
        let mut start = self.bufpos;
        while start < self.buffill {
            let written = self.io.write(&self.buffer[start..self.buffill])?;
            if written == 0 {
                return Err(VfsError::new(VfsErrorKind::Io, "file.flush.stalled"));
            }
            start += written;
        }
        self.bufpos = 0;
        self.buffill = 0;
        Ok(())
    }

    /// Logical position: the underlying position adjusted for whatever sits
    /// in the buffer.
    pub fn tell(&mut self) -> VfsResult<u64> {
        let pos = self.io.tell()?;
        if self.for_reading {
            Ok(pos - (self.buffill - self.bufpos) as u64)
        } else {
            Ok(pos + self.buffill as u64)
        }
    }

    pub fn seek(&mut self, pos: u64) -> VfsResult<()> {
        self.flush()?;

        if !self.buffer.is_empty() && self.for_reading {
            // Keep the buffer when the target is already inside it.
            let logical = self.tell()?;
            let offset = pos as i64 - logical as i64;
            let in_buffer = if offset >= 0 {
                offset as usize <= self.buffill - self.bufpos
            } else {
                (-offset) as usize <= self.bufpos
            };
            if in_buffer {
                self.bufpos = (self.bufpos as i64 + offset) as usize;
                return Ok(());
            }
        }

        self.buffill = 0;
        self.bufpos = 0;
        self.io.seek(pos)
    }

    pub fn length(&mut self) -> VfsResult<u64> {
        self.io.length()
    }

    pub fn eof(&mut self) -> bool {
        if !self.for_reading {
            return false;
        }
        if self.bufpos != self.buffill {
            return false;
        }
        match (self.io.tell(), self.io.length()) {
            (Ok(pos), Ok(len)) => pos >= len,
            _ => false,
        }
    }

    /// Install (or remove, with `0`) a transfer buffer of `size` bytes.
    pub fn set_buffer(&mut self, size: usize) -> VfsResult<()> {
        self.flush()?;

        // A read buffer may hold data beyond the logical position; park the
        // underlying cursor where the reader actually is.
        if self.for_reading && self.buffill != self.bufpos {
            let pos = self.io.tell()?;
            self.io.seek(pos - (self.buffill - self.bufpos) as u64)?;
        }

        if size == 0 {
            self.buffer = Vec::new();
        } else {
            self.buffer = vec![0; size];
        }
        self.buffill = 0;
        self.bufpos = 0;
        Ok(())
    }

    /// Flush and close. On a flush failure the handle is handed back inside
    /// the error so the caller can retry.
    pub fn close(mut self) -> Result<(), CloseError> {
        if !self.for_reading {
            if let Err(error) = self.flush() {
                return Err(CloseError { file: self, error });
            }
            if let Err(error) = self.io.flush() {
                return Err(CloseError { file: self, error });
            }
        }
        Ok(())
    }
}

impl Drop for VfsFile {
    fn drop(&mut self) {
        if !self.for_reading {
            let _ = self.flush();
            let _ = self.io.flush();
        }
    }
}

/// A failed [`VfsFile::close`]: the untouched handle plus the flush error.
pub struct CloseError {
    file: VfsFile,
    error: VfsError,
}

impl CloseError {
    pub fn error(&self) -> &VfsError {
        &self.error
    }

    pub fn into_error(self) -> VfsError {
        self.error
    }

    /// Recover the still-open handle to retry the flush.
    pub fn into_inner(self) -> VfsFile {
        self.file
    }
}

impl fmt::Debug for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "close failed: {}", self.error)
    }
}

impl std::error::Error for CloseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Pass-through stream over an open handle, for mounting an archive that
/// lives inside another mount.
pub(crate) struct HandleIo {
    file: VfsFile,
}

impl HandleIo {
    pub(crate) fn new(file: VfsFile) -> Self {
        Self { file }
    }
}

impl Io for HandleIo {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        self.file.write(buf)
    }

    fn seek(&mut self, offset: u64) -> VfsResult<()> {
        self.file.seek(offset)
    }

    fn tell(&mut self) -> VfsResult<u64> {
        self.file.tell()
    }

    fn length(&mut self) -> VfsResult<u64> {
        self.file.length()
    }

    fn flush(&mut self) -> VfsResult<()> {
        self.file.flush()
    }

    fn duplicate(&self) -> VfsResult<Box<dyn Io>> {
        let mut file = self.file.duplicate_unbuffered()?;
        file.seek(0)?;
        Ok(Box::new(HandleIo { file }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryIo, NativeIo, OpenMode};

    fn read_handle(data: &[u8]) -> VfsFile {
        VfsFile::new(
            Box::new(MemoryIo::new(data)),
            true,
            Arc::new(MountToken),
        )
    }

    fn read_to_end(file: &mut VfsFile) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 7];
        loop {
            let n = file.read(&mut chunk).expect("read");
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    #[test]
    fn buffered_and_unbuffered_reads_agree() {
        let data: Vec<u8> = (0u16..700).map(|v| (v % 251) as u8).collect();

        let mut plain = read_handle(&data[..]);
        let mut buffered = read_handle(&data[..]);
        buffered.set_buffer(64).expect("set_buffer");

        assert_eq!(read_to_end(&mut plain), read_to_end(&mut buffered));
        assert!(buffered.eof());
    }

    #[test]
    fn buffered_tell_reports_logical_position() {
        let mut file = read_handle(b"abcdefghijklmnopqrstuvwxyz");
        file.set_buffer(16).expect("set_buffer");

        let mut buf = [0u8; 3];
        file.read(&mut buf).expect("read");
        assert_eq!(&buf, b"abc");
        assert_eq!(file.tell().expect("tell"), 3);

        // Within the buffered window both directions stay in-buffer.
        file.seek(10).expect("seek fwd");
        assert_eq!(file.tell().expect("tell"), 10);
        file.read(&mut buf).expect("read");
        assert_eq!(&buf, b"klm");

        file.seek(1).expect("seek back");
        file.read(&mut buf).expect("read");
        assert_eq!(&buf, b"bcd");

        // Far outside the window falls back to a raw seek.
        file.seek(24).expect("seek raw");
        assert_eq!(file.tell().expect("tell"), 24);
        assert_eq!(file.read(&mut buf).expect("read"), 2);
        assert_eq!(&buf[..2], b"yz");
    }

    #[test]
    fn set_buffer_repositions_underlying_cursor() {
        let mut file = read_handle(b"0123456789");
        file.set_buffer(8).expect("set_buffer");
        let mut buf = [0u8; 2];
        file.read(&mut buf).expect("read");
        assert_eq!(file.tell().expect("tell"), 2);

        // Dropping the buffer must not lose the logical position.
        file.set_buffer(0).expect("clear buffer");
        assert_eq!(file.tell().expect("tell"), 2);
        file.read(&mut buf).expect("read");
        assert_eq!(&buf, b"23");
    }

    #[test]
    fn direction_is_enforced() {
        let mut file = read_handle(b"data");
        let err = file.write(b"x").expect_err("write on reader");
        assert_eq!(err.kind(), VfsErrorKind::OpenForReading);
    }

    #[test]
    fn buffered_writes_coalesce_and_spill() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.bin");
        let io = NativeIo::open(&path, OpenMode::Write).expect("open");
        let mut file = VfsFile::new(Box::new(io), false, Arc::new(MountToken));
        file.set_buffer(16).expect("set_buffer");

        file.write(b"12345").expect("write");
        file.write(b"67890").expect("write");
        // Still buffered; logical position is ahead of the stream.
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), 0);
        assert_eq!(file.tell().expect("tell"), 10);

        // Overflowing payload forces a flush followed by a write-through.
        file.write(b"ABCDEFGHIJK").expect("write big");
        assert_eq!(file.tell().expect("tell"), 21);

        let err = file.read(&mut [0u8; 1]).expect_err("read on writer");
        assert_eq!(err.kind(), VfsErrorKind::OpenForWriting);
        assert!(!file.eof());

        file.close().expect("close");
        assert_eq!(
            std::fs::read(&path).expect("read back"),
            b"1234567890ABCDEFGHIJK"
        );
    }

    #[test]
    fn drop_flushes_buffered_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dropped.bin");
        {
            let io = NativeIo::open(&path, OpenMode::Write).expect("open");
            let mut file = VfsFile::new(Box::new(io), false, Arc::new(MountToken));
            file.set_buffer(64).expect("set_buffer");
            file.write(b"kept").expect("write");
        }
        assert_eq!(std::fs::read(&path).expect("read back"), b"kept");
    }
}
