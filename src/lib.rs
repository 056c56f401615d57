//! packfs: a virtual filesystem layer for game archives.
//!
//! One `/`-delimited namespace over an ordered stack of mounts: real
//! directories, Build `GRP` groupfiles, Descent `MVL` movielibs and Quake
//! `PAK` packfiles, on disk or in memory. Reads probe the search path in
//! mount order; writes go to a single writable directory overlay.
//!
//! ```no_run
//! let vfs = packfs::init()?;
//! vfs.mount("DUKE3D.GRP", None, true)?;
//! let _file = vfs.open_read("GAME.CON")?;
//! # Ok::<(), packfs::VfsError>(())
//! ```

use std::sync::Arc;

pub use packfs_core::{
    last_error_code, read_all, set_last_error_code, Archive, Archiver, ArchiverCaps,
    ArchiverInfo, CloseError, DirArchiver, Enumerate, EnumerateCallback, FileType, Io, MemoryIo,
    NativeIo, OpenMode, Stat, UnpackedArchive, Vfs, VfsError, VfsErrorKind, VfsFile, VfsResult,
};
pub use packfs_formats::{GrpArchiver, MvlArchiver, QpakArchiver};

/// Build a [`Vfs`] with every built-in archive format registered.
pub fn init() -> VfsResult<Vfs> {
    let vfs = Vfs::new()?;
    vfs.register_archiver(Arc::new(GrpArchiver::new()))?;
    vfs.register_archiver(Arc::new(MvlArchiver::new()))?;
    vfs.register_archiver(Arc::new(QpakArchiver::new()))?;
    Ok(vfs)
}
