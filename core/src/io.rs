//! Seekable stream abstraction.
//!
//! Every byte source in the VFS (native files, memory buffers, byte ranges
//! inside an archive) implements [`Io`]. Streams are single-cursor;
//! [`Io::duplicate`] yields an independent cursor positioned at the start,
//! sharing the underlying data. Destruction is `Drop`.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{io_result, VfsError, VfsErrorKind, VfsResult};

impl std::fmt::Debug for dyn Io + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Io").finish_non_exhaustive()
    }
}

pub trait Io: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;

    /// Absolute seek from the start of the stream.
    fn seek(&mut self, offset: u64) -> VfsResult<()>;

    fn tell(&mut self) -> VfsResult<u64>;

    fn length(&mut self) -> VfsResult<u64>;

    fn flush(&mut self) -> VfsResult<()>;

    /// Independent cursor over the same data, positioned at the start.
    fn duplicate(&self) -> VfsResult<Box<dyn Io>>;
}

/// Fill `buf` completely or fail. Short sources produce an i/o error, which
/// probing callers treat as "not this format".
pub fn read_all(io: &mut dyn Io, buf: &mut [u8]) -> VfsResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = io.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(VfsError::new(VfsErrorKind::Io, "io.read_all.short"));
        }
        filled += n;
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

/// Stream over a native file. Duplication reopens the path, so the clone is
/// a genuinely independent OS-level cursor.
pub struct NativeIo {
    file: fs::File,
    path: PathBuf,
    mode: OpenMode,
}

impl NativeIo {
    pub fn open(path: &Path, mode: OpenMode) -> VfsResult<Self> {
        let file = match mode {
            OpenMode::Read => io_result("native.open_read", fs::File::open(path))?,
            OpenMode::Write => io_result("native.open_write", fs::File::create(path))?,
            OpenMode::Append => io_result(
                "native.open_append",
                fs::OpenOptions::new().append(true).create(true).open(path),
            )?,
        };
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }
}

impl Io for NativeIo {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        if self.mode != OpenMode::Read {
            return Err(VfsError::new(
                VfsErrorKind::OpenForWriting,
                "native.read.mode",
            ));
        }
        io_result("native.read", self.file.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        if self.mode == OpenMode::Read {
            return Err(VfsError::new(
                VfsErrorKind::OpenForReading,
                "native.write.mode",
            ));
        }
        io_result("native.write", self.file.write(buf))
    }

    fn seek(&mut self, offset: u64) -> VfsResult<()> {
        io_result("native.seek", self.file.seek(SeekFrom::Start(offset)))?;
        Ok(())
    }

    fn tell(&mut self) -> VfsResult<u64> {
        io_result("native.tell", self.file.stream_position())
    }

    fn length(&mut self) -> VfsResult<u64> {
        Ok(io_result("native.length", self.file.metadata())?.len())
    }

    fn flush(&mut self) -> VfsResult<()> {
        if self.mode == OpenMode::Read {
            return Ok(());
        }
        io_result("native.flush", self.file.flush())
    }

    fn duplicate(&self) -> VfsResult<Box<dyn Io>> {
        Ok(Box::new(NativeIo::open(&self.path, self.mode)?))
    }
}

/// Read-only stream over a shared in-memory buffer. Duplicates share the
/// buffer through the `Arc`; the buffer is released when the last cursor
/// drops.
pub struct MemoryIo {
    buf: Arc<[u8]>,
    pos: u64,
}

impl MemoryIo {
    pub fn new(buf: impl Into<Arc<[u8]>>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    #[cfg(test)]
    fn cursors(&self) -> usize {
        Arc::strong_count(&self.buf)
    }
}

impl Io for MemoryIo {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let avail = (self.buf.len() as u64 - self.pos) as usize;
        if avail == 0 {
            return Ok(0);
        }
        let n = buf.len().min(avail);
        let start = self.pos as usize;
        buf[..n].copy_from_slice(&self.buf[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::new(VfsErrorKind::OpenForReading, "memory.write"))
    }

    fn seek(&mut self, offset: u64) -> VfsResult<()> {
        if offset > self.buf.len() as u64 {
            return Err(VfsError::new(VfsErrorKind::PastEof, "memory.seek"));
        }
        self.pos = offset;
        Ok(())
    }

    fn tell(&mut self) -> VfsResult<u64> {
        Ok(self.pos)
    }

    fn length(&mut self) -> VfsResult<u64> {
        Ok(self.buf.len() as u64)
    }

    fn flush(&mut self) -> VfsResult<()> {
        Ok(())
    }

    fn duplicate(&self) -> VfsResult<Box<dyn Io>> {
        Ok(Box::new(Self {
            buf: self.buf.clone(),
            pos: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_read_and_seek() {
        let mut io = MemoryIo::new(&b"hello world"[..]);
        let mut buf = [0u8; 5];
        read_all(&mut io, &mut buf).expect("read");
        assert_eq!(&buf, b"hello");
        assert_eq!(io.tell().expect("tell"), 5);

        io.seek(6).expect("seek");
        read_all(&mut io, &mut buf).expect("read");
        assert_eq!(&buf, b"world");
        assert_eq!(io.read(&mut buf).expect("eof read"), 0);
    }

    #[test]
    fn memory_seek_to_exact_end_is_allowed() {
        let mut io = MemoryIo::new(&b"abc"[..]);
        io.seek(3).expect("seek to eof");
        assert_eq!(io.read(&mut [0u8; 1]).expect("read"), 0);
        let err = io.seek(4).expect_err("seek past eof");
        assert_eq!(err.kind(), VfsErrorKind::PastEof);
    }

    #[test]
    fn memory_rejects_writes() {
        let mut io = MemoryIo::new(&b"abc"[..]);
        let err = io.write(b"x").expect_err("write");
        assert_eq!(err.kind(), VfsErrorKind::OpenForReading);
    }

    #[test]
    fn memory_duplicates_share_one_buffer() {
        let io = MemoryIo::new(&b"shared"[..]);
        assert_eq!(io.cursors(), 1);
        let mut dup = io.duplicate().expect("dup");
        assert_eq!(io.cursors(), 2);

        let mut buf = [0u8; 6];
        read_all(dup.as_mut(), &mut buf).expect("read dup");
        assert_eq!(&buf, b"shared");

        drop(dup);
        assert_eq!(io.cursors(), 1);
    }

    #[test]
    fn native_roundtrip_and_duplicate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("file.bin");

        let mut w = NativeIo::open(&path, OpenMode::Write).expect("open write");
        assert_eq!(w.write(b"0123456789").expect("write"), 10);
        let err = w.read(&mut [0u8; 1]).expect_err("read on writer");
        assert_eq!(err.kind(), VfsErrorKind::OpenForWriting);
        w.flush().expect("flush");
        drop(w);

        let mut r = NativeIo::open(&path, OpenMode::Read).expect("open read");
        assert_eq!(r.length().expect("length"), 10);
        r.seek(4).expect("seek");
        let mut buf = [0u8; 3];
        read_all(&mut r, &mut buf).expect("read");
        assert_eq!(&buf, b"456");

        // The duplicate starts at the beginning, independent of `r`.
        let mut dup = r.duplicate().expect("dup");
        assert_eq!(dup.tell().expect("tell"), 0);
        read_all(dup.as_mut(), &mut buf).expect("read dup");
        assert_eq!(&buf, b"012");
        assert_eq!(r.tell().expect("tell"), 7);

        let err = r.write(b"x").expect_err("write on reader");
        assert_eq!(err.kind(), VfsErrorKind::OpenForReading);
    }

    #[test]
    fn native_append_extends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.txt");

        let mut w = NativeIo::open(&path, OpenMode::Write).expect("open write");
        w.write(b"one").expect("write");
        drop(w);

        let mut a = NativeIo::open(&path, OpenMode::Append).expect("open append");
        a.write(b"two").expect("append");
        drop(a);

        assert_eq!(fs::read(&path).expect("read back"), b"onetwo");
    }
}
