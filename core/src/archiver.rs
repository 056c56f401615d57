//! Archive backend interface.
//!
//! An [`Archiver`] understands one on-disk format: it probes a candidate
//! source ([`Archiver::claims`]) and opens it into an [`Archive`], the
//! per-mount object the engine dispatches lookups to. Registered archivers
//! are value records; there is no registry-global state.

use std::borrow::Cow;

use bitflags::bitflags;

use crate::error::VfsResult;
use crate::io::Io;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ArchiverCaps: u32 {
        /// Entries inside the archive may be symbolic links.
        const SYMLINKS = 1 << 0;
        /// The backend accepts `open_write`/`open_append`/`remove`/`mkdir`.
        const WRITE = 1 << 1;
    }
}

/// Static description of a backend, keyed by filename extension for mount
/// dispatch.
#[derive(Clone, Debug)]
pub struct ArchiverInfo {
    pub extension: Cow<'static, str>,
    pub description: Cow<'static, str>,
    pub author: Cow<'static, str>,
    pub url: Cow<'static, str>,
    pub caps: ArchiverCaps,
}

impl ArchiverInfo {
    pub fn supports_symlinks(&self) -> bool {
        self.caps.contains(ArchiverCaps::SYMLINKS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Other,
}

#[derive(Clone, Copy, Debug)]
pub struct Stat {
    pub file_type: FileType,
    /// Size in bytes; `0` for directories, `-1` when unknown.
    pub size: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub atime: i64,
    pub readonly: bool,
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            file_type: FileType::Other,
            size: -1,
            mtime: -1,
            ctime: -1,
            atime: -1,
            readonly: true,
        }
    }
}

/// Verdict of an enumeration callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enumerate {
    Continue,
    Stop,
}

pub type EnumerateCallback<'a> = &'a mut dyn FnMut(&str) -> VfsResult<Enumerate>;

impl std::fmt::Debug for dyn Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Archiver").finish_non_exhaustive()
    }
}

pub trait Archiver: Send + Sync {
    fn info(&self) -> &ArchiverInfo;

    /// Cheap probe: does this source look like ours? `io` is `None` when the
    /// source is a directory on disk (only the real-directory backend claims
    /// those). The stream arrives positioned at the start; probe errors are
    /// treated as a refusal.
    fn claims(&self, io: Option<&mut dyn Io>, name: &str) -> VfsResult<bool>;

    /// Open a claimed source. The stream arrives re-positioned at the start.
    /// A failure here aborts the mount; no other archiver is tried.
    fn open_archive(
        &self,
        io: Option<Box<dyn Io>>,
        name: &str,
        for_writing: bool,
    ) -> VfsResult<Box<dyn Archive>>;
}

/// An opened archive. Paths are sanitized, mount-relative, `/`-separated.
impl std::fmt::Debug for dyn Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Archive").finish_non_exhaustive()
    }
}

pub trait Archive: Send + Sync {
    fn open_read(&self, path: &str) -> VfsResult<Box<dyn Io>>;

    fn open_write(&self, path: &str) -> VfsResult<Box<dyn Io>>;

    fn open_append(&self, path: &str) -> VfsResult<Box<dyn Io>>;

    fn remove(&self, path: &str) -> VfsResult<()>;

    fn mkdir(&self, path: &str) -> VfsResult<()>;

    fn stat(&self, path: &str) -> VfsResult<Stat>;

    /// Yield the name (final segment only) of each entry in `dir`.
    fn enumerate(&self, dir: &str, callback: EnumerateCallback<'_>) -> VfsResult<Enumerate>;
}
