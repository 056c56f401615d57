//! Mount records and archiver dispatch.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::archiver::{Archive, Archiver};
use crate::error::{io_result, VfsError, VfsErrorKind, VfsResult};
use crate::io::{Io, NativeIo, OpenMode};
use crate::path;

/// Token cloned into every handle opened through a mount. Outstanding clones
/// pin the mount: unmounting while any exist fails with `FilesStillOpen`.
pub(crate) struct MountToken;

/// One bound archive on the search path (or the write dir).
pub(crate) struct Mount {
    pub archive: Box<dyn Archive>,
    pub archiver: Arc<dyn Archiver>,
    pub dir_name: String,
    /// Sanitized virtual prefix ending in `/`; `None` means grafted at `/`.
    pub mount_point: Option<String>,
    /// Sanitized sub-root prepended to every lookup inside the archive.
    pub root: Option<String>,
    pub token: Arc<MountToken>,
}

impl Mount {
    pub fn open_handles(&self) -> usize {
        Arc::strong_count(&self.token) - 1
    }
}

/// Sanitize a caller-supplied mount point; `None`, `""` and `"/"` all mean
/// the virtual root.
pub(crate) fn normalize_mount_point(mount_point: Option<&str>) -> VfsResult<Option<String>> {
    let Some(mount_point) = mount_point else {
        return Ok(None);
    };
    let clean = path::sanitize(mount_point)?;
    if clean.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("{clean}/")))
}

/// Find the archiver willing to own `name` and open it.
///
/// Disk directories go to whichever backend claims path sources (the
/// real-directory one). Everything else becomes a stream: archivers whose
/// extension matches the source name probe first, then the rest. An archiver
/// that claims a stream but fails to open it aborts the whole attempt.
pub(crate) fn open_archive(
    archivers: &[Arc<dyn Archiver>],
    io: Option<Box<dyn Io>>,
    name: &str,
    for_writing: bool,
) -> VfsResult<(Box<dyn Archive>, Arc<dyn Archiver>)> {
    let mut io = match io {
        Some(io) => io,
        None => {
            let meta = io_result("mount.stat_source", fs::metadata(name))?;
            if meta.is_dir() {
                for archiver in archivers {
                    if archiver.claims(None, name).unwrap_or(false) {
                        let archive = archiver.open_archive(None, name, for_writing)?;
                        return Ok((archive, archiver.clone()));
                    }
                }
                return Err(VfsError::new(VfsErrorKind::Unsupported, "mount.directory"));
            }
            let mode = if for_writing {
                OpenMode::Write
            } else {
                OpenMode::Read
            };
            Box::new(NativeIo::open(Path::new(name), mode)?) as Box<dyn Io>
        }
    };

    let ext = path::extension(name);
    let ext_matches = |archiver: &Arc<dyn Archiver>| {
        ext.is_some_and(|e| path::eq_case_fold(e, &archiver.info().extension))
    };

    // Matching extensions first, then everybody else.
    for matching_pass in [true, false] {
        for archiver in archivers {
            if ext_matches(archiver) != matching_pass {
                continue;
            }
            io.seek(0)?;
            if !archiver.claims(Some(io.as_mut()), name).unwrap_or(false) {
                trace!(
                    archiver = %archiver.info().extension,
                    source = name,
                    "archiver declined source"
                );
                continue;
            }
            io.seek(0)?;
            return match archiver.open_archive(Some(io), name, for_writing) {
                Ok(archive) => Ok((archive, archiver.clone())),
                Err(err) => {
                    warn!(
                        archiver = %archiver.info().extension,
                        source = name,
                        error = %err,
                        "claimed archive failed to open"
                    );
                    Err(err)
                }
            };
        }
    }

    Err(VfsError::new(VfsErrorKind::Unsupported, "mount.unsupported"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::{ArchiverCaps, ArchiverInfo, Enumerate, EnumerateCallback, Stat};
    use crate::io::{read_all, MemoryIo};

    struct NullArchive;

    impl Archive for NullArchive {
        fn open_read(&self, _path: &str) -> VfsResult<Box<dyn Io>> {
            Err(VfsError::new(VfsErrorKind::NotFound, "null.open_read"))
        }
        fn open_write(&self, _path: &str) -> VfsResult<Box<dyn Io>> {
            Err(VfsError::new(VfsErrorKind::ReadOnly, "null.open_write"))
        }
        fn open_append(&self, _path: &str) -> VfsResult<Box<dyn Io>> {
            Err(VfsError::new(VfsErrorKind::ReadOnly, "null.open_append"))
        }
        fn remove(&self, _path: &str) -> VfsResult<()> {
            Err(VfsError::new(VfsErrorKind::ReadOnly, "null.remove"))
        }
        fn mkdir(&self, _path: &str) -> VfsResult<()> {
            Err(VfsError::new(VfsErrorKind::ReadOnly, "null.mkdir"))
        }
        fn stat(&self, _path: &str) -> VfsResult<Stat> {
            Err(VfsError::new(VfsErrorKind::NotFound, "null.stat"))
        }
        fn enumerate(
            &self,
            _dir: &str,
            _callback: EnumerateCallback<'_>,
        ) -> VfsResult<Enumerate> {
            Ok(Enumerate::Continue)
        }
    }

    struct SigArchiver {
        info: ArchiverInfo,
        sig: &'static [u8; 4],
        fail_open: bool,
    }

    impl SigArchiver {
        fn new(extension: &'static str, sig: &'static [u8; 4], fail_open: bool) -> Self {
            Self {
                info: ArchiverInfo {
                    extension: extension.into(),
                    description: "test format".into(),
                    author: "tests".into(),
                    url: "".into(),
                    caps: ArchiverCaps::empty(),
                },
                sig,
                fail_open,
            }
        }
    }

    impl Archiver for SigArchiver {
        fn info(&self) -> &ArchiverInfo {
            &self.info
        }

        fn claims(&self, io: Option<&mut dyn Io>, _name: &str) -> VfsResult<bool> {
            let Some(io) = io else {
                return Ok(false);
            };
            let mut sig = [0u8; 4];
            read_all(io, &mut sig)?;
            Ok(&sig == self.sig)
        }

        fn open_archive(
            &self,
            _io: Option<Box<dyn Io>>,
            _name: &str,
            _for_writing: bool,
        ) -> VfsResult<Box<dyn Archive>> {
            if self.fail_open {
                return Err(VfsError::new(VfsErrorKind::Corrupt, "sig.open_archive"));
            }
            Ok(Box::new(NullArchive))
        }
    }

    fn archivers(fail_open: bool) -> Vec<Arc<dyn Archiver>> {
        vec![
            Arc::new(SigArchiver::new("aaa", b"AAAA", false)),
            Arc::new(SigArchiver::new("bbb", b"BBBB", fail_open)),
        ]
    }

    #[test]
    fn dispatch_matches_signature_regardless_of_extension() {
        let io = Box::new(MemoryIo::new(&b"BBBB rest of archive"[..]));
        let (_, archiver) =
            open_archive(&archivers(false), Some(io), "oddly_named.aaa", false).expect("open");
        assert_eq!(archiver.info().extension, "bbb");
    }

    #[test]
    fn dispatch_rejects_unknown_signatures() {
        let io = Box::new(MemoryIo::new(&b"what is this"[..]));
        let err = open_archive(&archivers(false), Some(io), "mystery.bin", false)
            .expect_err("unsupported");
        assert_eq!(err.kind(), VfsErrorKind::Unsupported);
    }

    #[test]
    fn claimed_but_failed_open_aborts() {
        let io = Box::new(MemoryIo::new(&b"BBBB truncated"[..]));
        let err =
            open_archive(&archivers(true), Some(io), "broken.bbb", false).expect_err("abort");
        assert_eq!(err.kind(), VfsErrorKind::Corrupt);
    }

    #[test]
    fn mount_points_normalize_to_trailing_slash() {
        assert_eq!(normalize_mount_point(None).expect("ok"), None);
        assert_eq!(normalize_mount_point(Some("/")).expect("ok"), None);
        assert_eq!(
            normalize_mount_point(Some("/game/data/")).expect("ok"),
            Some("game/data/".to_owned())
        );
        assert_eq!(
            normalize_mount_point(Some("game")).expect("ok"),
            Some("game/".to_owned())
        );
        assert!(normalize_mount_point(Some("a/../b")).is_err());
    }
}
