//! Core error surface.
//!
//! Failures are described by a closed set of [`VfsErrorKind`] values with
//! stable numeric codes, wrapped in a [`VfsError`] carrying a short static
//! context string (e.g. `"mount.busy"`). Every constructed error also records
//! its kind in a per-thread slot so callers keeping the classic
//! last-error-code discipline can read it back with [`last_error_code`].

use std::cell::Cell;
use std::fmt;
use thiserror::Error;

/// Semantic failure modes. Discriminants are stable and part of the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VfsErrorKind {
    Ok = 0,
    Other = 1,
    OutOfMemory = 2,
    NotInitialized = 3,
    IsInitialized = 4,
    Argv0IsNull = 5,
    Unsupported = 6,
    PastEof = 7,
    FilesStillOpen = 8,
    InvalidArgument = 9,
    NotMounted = 10,
    NotFound = 11,
    SymlinkForbidden = 12,
    NoWriteDir = 13,
    OpenForReading = 14,
    OpenForWriting = 15,
    NotAFile = 16,
    ReadOnly = 17,
    Corrupt = 18,
    SymlinkLoop = 19,
    Io = 20,
    Permission = 21,
    NoSpace = 22,
    BadFilename = 23,
    Busy = 24,
    DirNotEmpty = 25,
    OsError = 26,
    Duplicate = 27,
    BadPassword = 28,
    AppCallback = 29,
}

impl VfsErrorKind {
    /// Stable numeric code for this kind.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Human-readable description of this kind.
    pub fn describe(self) -> &'static str {
        match self {
            VfsErrorKind::Ok => "no error",
            VfsErrorKind::Other => "another error occurred",
            VfsErrorKind::OutOfMemory => "out of memory",
            VfsErrorKind::NotInitialized => "not initialized",
            VfsErrorKind::IsInitialized => "already initialized",
            VfsErrorKind::Argv0IsNull => "argv0 is unavailable",
            VfsErrorKind::Unsupported => "operation not supported",
            VfsErrorKind::PastEof => "seek past end of file",
            VfsErrorKind::FilesStillOpen => "files still open",
            VfsErrorKind::InvalidArgument => "invalid argument",
            VfsErrorKind::NotMounted => "archive is not mounted",
            VfsErrorKind::NotFound => "no such path",
            VfsErrorKind::SymlinkForbidden => "symlink is not permitted",
            VfsErrorKind::NoWriteDir => "no write directory is set",
            VfsErrorKind::OpenForReading => "file open for reading",
            VfsErrorKind::OpenForWriting => "file open for writing",
            VfsErrorKind::NotAFile => "not a file",
            VfsErrorKind::ReadOnly => "read-only filesystem",
            VfsErrorKind::Corrupt => "corrupted archive",
            VfsErrorKind::SymlinkLoop => "infinite symbolic link loop",
            VfsErrorKind::Io => "i/o error",
            VfsErrorKind::Permission => "permission denied",
            VfsErrorKind::NoSpace => "no space left on device",
            VfsErrorKind::BadFilename => "filename is illegal",
            VfsErrorKind::Busy => "tried to modify a file the OS needs",
            VfsErrorKind::DirNotEmpty => "directory isn't empty",
            VfsErrorKind::OsError => "unclassified OS error",
            VfsErrorKind::Duplicate => "duplicate resource",
            VfsErrorKind::BadPassword => "bad password",
            VfsErrorKind::AppCallback => "application callback reported an error",
        }
    }
}

impl fmt::Display for VfsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

thread_local! {
    static LAST_ERROR: Cell<VfsErrorKind> = const { Cell::new(VfsErrorKind::Ok) };
}

/// Most recent error kind recorded on the calling thread.
pub fn last_error_code() -> VfsErrorKind {
    LAST_ERROR.with(|slot| slot.get())
}

/// Overwrite the calling thread's recorded error kind.
pub fn set_last_error_code(kind: VfsErrorKind) {
    LAST_ERROR.with(|slot| slot.set(kind));
}

/// A VFS failure: a [`VfsErrorKind`] plus a static context tag naming the
/// operation that produced it.
#[derive(Debug, Error)]
#[error("{context}: {kind}")]
pub struct VfsError {
    kind: VfsErrorKind,
    context: &'static str,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl VfsError {
    pub fn new(kind: VfsErrorKind, context: &'static str) -> Self {
        set_last_error_code(kind);
        Self {
            kind,
            context,
            source: None,
        }
    }

    pub fn with_source(
        kind: VfsErrorKind,
        context: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        set_last_error_code(kind);
        Self {
            kind,
            context,
            source: Some(source.into()),
        }
    }

    /// Wrap a failed enumeration callback without clobbering the thread's
    /// recorded kind (the cause already recorded itself when it was built).
    pub fn app_callback(context: &'static str, cause: VfsError) -> Self {
        Self {
            kind: VfsErrorKind::AppCallback,
            context,
            source: Some(Box::new(cause)),
        }
    }

    pub fn kind(&self) -> VfsErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

/// Best-effort normalization of host errors into the closed kind set.
pub fn io_error_kind(err: &std::io::Error) -> VfsErrorKind {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => VfsErrorKind::NotFound,
        ErrorKind::PermissionDenied => VfsErrorKind::Permission,
        ErrorKind::AlreadyExists => VfsErrorKind::Duplicate,
        ErrorKind::InvalidInput => VfsErrorKind::InvalidArgument,
        ErrorKind::Unsupported => VfsErrorKind::Unsupported,
        ErrorKind::OutOfMemory => VfsErrorKind::OutOfMemory,
        _ => VfsErrorKind::Io,
    }
}

pub fn map_io_error(context: &'static str, err: std::io::Error) -> VfsError {
    let kind = io_error_kind(&err);
    VfsError::with_source(kind, context, err)
}

pub fn io_result<T>(context: &'static str, result: std::io::Result<T>) -> VfsResult<T> {
    result.map_err(|err| map_io_error(context, err))
}
