//! Shared implementation for unpacked archive formats.
//!
//! Formats whose contents are stored contiguously and uncompressed (GRP,
//! MVL, QPAK and friends; there are an alarming number of these) only need
//! to parse their directory record; everything else is the same: a
//! [`DirTree`] over the parent stream, with reads served by byte-range
//! cursors into it. Adapters parse their header, construct an
//! [`UnpackedArchive`] around the stream and feed it entries.

use parking_lot::Mutex;

use crate::archiver::{Archive, Enumerate, EnumerateCallback, FileType, Stat};
use crate::error::{VfsError, VfsErrorKind, VfsResult};
use crate::io::Io;
use crate::tree::DirTree;

#[derive(Default, Clone, Copy)]
struct UnpackedData {
    start: u64,
    size: u64,
    ctime: i64,
    mtime: i64,
}

struct Inner {
    tree: DirTree<UnpackedData>,
    io: Box<dyn Io>,
}

pub struct UnpackedArchive {
    inner: Mutex<Inner>,
}

impl UnpackedArchive {
    /// Take ownership of the parent stream. The stream is only used to mint
    /// duplicates; each opened entry gets its own cursor.
    pub fn new(io: Box<dyn Io>, case_sensitive: bool, only_usascii: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tree: DirTree::new(case_sensitive, only_usascii),
                io,
            }),
        }
    }

    /// Record one entry from the format's directory. `start` and `size` are
    /// ignored for directories. Missing ancestors are created.
    pub fn add_entry(
        &mut self,
        name: &str,
        is_dir: bool,
        ctime: i64,
        mtime: i64,
        start: u64,
        size: u64,
    ) -> VfsResult<()> {
        let inner = self.inner.get_mut();
        let idx = inner.tree.add(name, is_dir)?;
        *inner.tree.data_mut(idx) = UnpackedData {
            start: if is_dir { 0 } else { start },
            size: if is_dir { 0 } else { size },
            ctime,
            mtime,
        };
        Ok(())
    }
}

impl Archive for UnpackedArchive {
    fn open_read(&self, path: &str) -> VfsResult<Box<dyn Io>> {
        let mut inner = self.inner.lock();
        let idx = inner
            .tree
            .find(path)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotFound, "unpacked.open_read"))?;
        if inner.tree.is_dir(idx) {
            return Err(VfsError::new(VfsErrorKind::NotAFile, "unpacked.open_read"));
        }
        let UnpackedData { start, size, .. } = *inner.tree.data(idx);
        let mut io = inner.io.duplicate()?;
        io.seek(start)?;
        Ok(Box::new(EntryIo {
            io,
            start,
            size,
            pos: 0,
        }))
    }

    fn open_write(&self, _path: &str) -> VfsResult<Box<dyn Io>> {
        Err(VfsError::new(VfsErrorKind::ReadOnly, "unpacked.open_write"))
    }

    fn open_append(&self, _path: &str) -> VfsResult<Box<dyn Io>> {
        Err(VfsError::new(VfsErrorKind::ReadOnly, "unpacked.open_append"))
    }

    fn remove(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::ReadOnly, "unpacked.remove"))
    }

    fn mkdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::ReadOnly, "unpacked.mkdir"))
    }

    fn stat(&self, path: &str) -> VfsResult<Stat> {
        let mut inner = self.inner.lock();
        let idx = inner
            .tree
            .find(path)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotFound, "unpacked.stat"))?;
        let data = *inner.tree.data(idx);
        let is_dir = inner.tree.is_dir(idx);
        Ok(Stat {
            file_type: if is_dir {
                FileType::Directory
            } else {
                FileType::Regular
            },
            size: if is_dir { 0 } else { data.size as i64 },
            mtime: data.mtime,
            ctime: data.ctime,
            atime: -1,
            readonly: true,
        })
    }

    fn enumerate(&self, dir: &str, callback: EnumerateCallback<'_>) -> VfsResult<Enumerate> {
        // Snapshot the names first; the callback must be able to call back
        // into this archive (e.g. to stat entries) without holding our lock.
        let names = {
            let mut inner = self.inner.lock();
            let mut names = Vec::new();
            inner.tree.enumerate(dir, &mut |name| {
                names.push(name.to_owned());
                Ok(Enumerate::Continue)
            })?;
            names
        };
        for name in &names {
            match callback(name) {
                Ok(Enumerate::Continue) => {}
                Ok(Enumerate::Stop) => return Ok(Enumerate::Stop),
                Err(err) => return Err(VfsError::app_callback("unpacked.enumerate", err)),
            }
        }
        Ok(Enumerate::Continue)
    }
}

/// Cursor over a contiguous byte range of a parent stream.
///
/// Reads clamp to the range and delegate without re-seeking the parent, so a
/// range cursor is only coherent while it owns its parent duplicate, which
/// is exactly how [`UnpackedArchive::open_read`] builds it.
struct EntryIo {
    io: Box<dyn Io>,
    start: u64,
    size: u64,
    pos: u64,
}

impl Io for EntryIo {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let rest = (self.size - self.pos) as usize;
        if rest == 0 {
            return Ok(0);
        }
        let want = buf.len().min(rest);
        let got = self.io.read(&mut buf[..want])?;
        self.pos += got as u64;
        Ok(got)
    }

    fn write(&mut self, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::new(VfsErrorKind::ReadOnly, "entry.write"))
    }

    fn seek(&mut self, offset: u64) -> VfsResult<()> {
        if offset > self.size {
            return Err(VfsError::new(VfsErrorKind::PastEof, "entry.seek"));
        }
        self.io.seek(self.start + offset)?;
        self.pos = offset;
        Ok(())
    }

    fn tell(&mut self) -> VfsResult<u64> {
        Ok(self.pos)
    }

    fn length(&mut self) -> VfsResult<u64> {
        Ok(self.size)
    }

    fn flush(&mut self) -> VfsResult<()> {
        Ok(())
    }

    fn duplicate(&self) -> VfsResult<Box<dyn Io>> {
        let mut io = self.io.duplicate()?;
        io.seek(self.start)?;
        Ok(Box::new(EntryIo {
            io,
            start: self.start,
            size: self.size,
            pos: 0,
        }))
    }
}
