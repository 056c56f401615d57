//! Core of the packfs virtual filesystem layer.
//!
//! Applications address game assets through platform-independent `/` paths;
//! a [`Vfs`] resolves each path across an ordered stack of mounted archives
//! (a real directory counts as an archive) and hands back seekable,
//! optionally buffered handles. Format support plugs in through the
//! [`Archiver`] trait; formats that store entries contiguously and
//! uncompressed build on [`UnpackedArchive`] and only parse their directory
//! record.
//!
//! Path safety is enforced centrally: `..`, `\` and `:` never reach a
//! backend, and with symlinks forbidden (the default) every path prefix is
//! checked before a symlink-capable backend may serve it.

pub mod archiver;
pub mod dir;
pub mod error;
pub mod handle;
pub mod io;
mod mount;
pub mod path;
pub mod tree;
pub mod unpacked;
mod vfs;

pub use archiver::{
    Archive, Archiver, ArchiverCaps, ArchiverInfo, Enumerate, EnumerateCallback, FileType, Stat,
};
pub use dir::DirArchiver;
pub use error::{
    last_error_code, set_last_error_code, VfsError, VfsErrorKind, VfsResult,
};
pub use handle::{CloseError, VfsFile};
pub use io::{read_all, Io, MemoryIo, NativeIo, OpenMode};
pub use unpacked::UnpackedArchive;
pub use vfs::Vfs;
