//! Direct filesystem backend.
//!
//! Mounts a real directory tree. This is the only backend with write
//! support, which makes it the backing for the write dir. It claims
//! directory sources before any stream archiver gets a look.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::archiver::{
    Archive, Archiver, ArchiverCaps, ArchiverInfo, Enumerate, EnumerateCallback, FileType, Stat,
};
use crate::error::{io_result, VfsError, VfsErrorKind, VfsResult};
use crate::io::{Io, NativeIo, OpenMode};

pub struct DirArchiver {
    info: ArchiverInfo,
}

impl DirArchiver {
    pub fn new() -> Self {
        Self {
            info: ArchiverInfo {
                extension: "".into(),
                description: "Non-archive, direct filesystem I/O".into(),
                author: "packfs contributors".into(),
                url: "https://github.com/packfs/packfs".into(),
                caps: ArchiverCaps::SYMLINKS | ArchiverCaps::WRITE,
            },
        }
    }
}

impl Default for DirArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for DirArchiver {
    fn info(&self) -> &ArchiverInfo {
        &self.info
    }

    fn claims(&self, io: Option<&mut dyn Io>, name: &str) -> VfsResult<bool> {
        if io.is_some() {
            return Ok(false);
        }
        Ok(fs::metadata(name).map(|m| m.is_dir()).unwrap_or(false))
    }

    fn open_archive(
        &self,
        _io: Option<Box<dyn Io>>,
        name: &str,
        _for_writing: bool,
    ) -> VfsResult<Box<dyn Archive>> {
        let meta = io_result("dir.open_archive", fs::metadata(name))?;
        if !meta.is_dir() {
            return Err(VfsError::new(VfsErrorKind::Unsupported, "dir.open_archive"));
        }
        Ok(Box::new(DirArchive {
            root: PathBuf::from(name),
        }))
    }
}

struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    fn resolve(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    fn open_file(&self, path: &str, mode: OpenMode) -> VfsResult<Box<dyn Io>> {
        let full = self.resolve(path);
        if mode == OpenMode::Read && full.is_dir() {
            return Err(VfsError::new(VfsErrorKind::NotAFile, "dir.open_read"));
        }
        Ok(Box::new(NativeIo::open(&full, mode)?))
    }
}

fn unix_secs(time: std::io::Result<SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(-1)
}

fn stat_path(full: &Path) -> VfsResult<Stat> {
    // lstat semantics: symlinks must be visible to the symlink policy walk.
    let meta = io_result("dir.stat", fs::symlink_metadata(full))?;
    let file_type = if meta.file_type().is_symlink() {
        FileType::Symlink
    } else if meta.is_dir() {
        FileType::Directory
    } else if meta.is_file() {
        FileType::Regular
    } else {
        FileType::Other
    };
    Ok(Stat {
        file_type,
        size: if meta.is_dir() { 0 } else { meta.len() as i64 },
        mtime: unix_secs(meta.modified()),
        ctime: unix_secs(meta.created()),
        atime: unix_secs(meta.accessed()),
        readonly: meta.permissions().readonly(),
    })
}

impl Archive for DirArchive {
    fn open_read(&self, path: &str) -> VfsResult<Box<dyn Io>> {
        self.open_file(path, OpenMode::Read)
    }

    fn open_write(&self, path: &str) -> VfsResult<Box<dyn Io>> {
        self.open_file(path, OpenMode::Write)
    }

    fn open_append(&self, path: &str) -> VfsResult<Box<dyn Io>> {
        self.open_file(path, OpenMode::Append)
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        let full = self.resolve(path);
        let meta = io_result("dir.remove", fs::symlink_metadata(&full))?;
        if meta.is_dir() {
            io_result("dir.remove_dir", fs::remove_dir(&full))
        } else {
            io_result("dir.remove_file", fs::remove_file(&full))
        }
    }

    fn mkdir(&self, path: &str) -> VfsResult<()> {
        // One component; the mount engine walks intermediate segments.
        io_result("dir.mkdir", fs::create_dir(self.resolve(path)))
    }

    fn stat(&self, path: &str) -> VfsResult<Stat> {
        stat_path(&self.resolve(path))
    }

    fn enumerate(&self, dir: &str, callback: EnumerateCallback<'_>) -> VfsResult<Enumerate> {
        let entries = io_result("dir.enumerate", fs::read_dir(self.resolve(dir)))?;
        for entry in entries {
            let entry = io_result("dir.enumerate.entry", entry)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match callback(name) {
                Ok(Enumerate::Continue) => {}
                Ok(Enumerate::Stop) => return Ok(Enumerate::Stop),
                Err(err) => return Err(VfsError::app_callback("dir.enumerate", err)),
            }
        }
        Ok(Enumerate::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_all;

    fn sandbox() -> (tempfile::TempDir, Box<dyn Archive>) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("top.txt"), b"top level").expect("write");
        fs::write(dir.path().join("sub/inner.txt"), b"inner").expect("write");
        let archiver = DirArchiver::new();
        let archive = archiver
            .open_archive(None, dir.path().to_str().expect("utf8 path"), false)
            .expect("open archive");
        (dir, archive)
    }

    #[test]
    fn claims_directories_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("plain.dat"), b"x").expect("write");
        let archiver = DirArchiver::new();
        let dir_path = dir.path().to_str().expect("utf8");
        let file_path = dir.path().join("plain.dat");

        assert!(archiver.claims(None, dir_path).expect("claims"));
        assert!(!archiver
            .claims(None, file_path.to_str().expect("utf8"))
            .expect("claims"));
        assert!(!archiver
            .claims(None, dir.path().join("missing").to_str().expect("utf8"))
            .expect("claims"));
    }

    #[test]
    fn reads_and_stats_entries() {
        let (_dir, archive) = sandbox();
        let mut io = archive.open_read("sub/inner.txt").expect("open");
        let mut buf = [0u8; 5];
        read_all(io.as_mut(), &mut buf).expect("read");
        assert_eq!(&buf, b"inner");

        let st = archive.stat("top.txt").expect("stat");
        assert_eq!(st.file_type, FileType::Regular);
        assert_eq!(st.size, 9);
        let st = archive.stat("sub").expect("stat dir");
        assert_eq!(st.file_type, FileType::Directory);
        assert_eq!(st.size, 0);

        let err = archive.stat("nope.txt").expect_err("missing");
        assert_eq!(err.kind(), VfsErrorKind::NotFound);
        let err = archive.open_read("sub").expect_err("open dir");
        assert_eq!(err.kind(), VfsErrorKind::NotAFile);
    }

    #[test]
    fn write_remove_mkdir_roundtrip() {
        let (_dir, archive) = sandbox();
        let mut io = archive.open_write("new.bin").expect("open write");
        assert_eq!(io.write(b"fresh").expect("write"), 5);
        io.flush().expect("flush");
        drop(io);

        let mut io = archive.open_append("new.bin").expect("open append");
        io.write(b"!").expect("append");
        drop(io);

        let st = archive.stat("new.bin").expect("stat");
        assert_eq!(st.size, 6);

        archive.mkdir("made").expect("mkdir");
        assert_eq!(
            archive.stat("made").expect("stat").file_type,
            FileType::Directory
        );

        archive.remove("new.bin").expect("remove file");
        archive.remove("made").expect("remove dir");
        assert!(archive.stat("new.bin").is_err());
    }

    #[test]
    fn enumerate_lists_names() {
        let (_dir, archive) = sandbox();
        let mut names = Vec::new();
        archive
            .enumerate("", &mut |name| {
                names.push(name.to_owned());
                Ok(Enumerate::Continue)
            })
            .expect("enumerate");
        names.sort();
        assert_eq!(names, ["sub", "top.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_reported() {
        let (dir, archive) = sandbox();
        std::os::unix::fs::symlink(dir.path().join("top.txt"), dir.path().join("link.txt"))
            .expect("symlink");
        let st = archive.stat("link.txt").expect("stat");
        assert_eq!(st.file_type, FileType::Symlink);
    }
}
