//! The `Vfs` service object.
//!
//! All process-wide state of the library (the ordered search path, the
//! write dir, the archiver registry, the symlink policy and the computed
//! platform directories) lives in one `Vfs` value. Every operation that
//! touches mount state serializes on one internal lock; enumeration
//! callbacks run with that lock held and must not re-enter the library.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::archiver::{Archive, Archiver, ArchiverInfo, Enumerate, FileType, Stat};
use crate::dir::DirArchiver;
use crate::error::{VfsError, VfsErrorKind, VfsResult};
use crate::handle::{HandleIo, VfsFile};
use crate::io::{Io, MemoryIo};
use crate::mount::{self, Mount, MountToken};
use crate::path::{self, part_of_mount_point};

struct State {
    search_path: Vec<Mount>,
    write_dir: Option<Mount>,
}

pub struct Vfs {
    state: Mutex<State>,
    archivers: RwLock<Vec<Arc<dyn Archiver>>>,
    allow_symlinks: AtomicBool,
    base_dir: PathBuf,
    user_dir: PathBuf,
}

impl Vfs {
    /// Construct a context with the real-directory backend registered.
    /// Format archivers are registered by the caller (or the `packfs`
    /// facade's `init`).
    pub fn new() -> VfsResult<Self> {
        let exe = crate::error::io_result("vfs.base_dir", std::env::current_exe())?;
        let base_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| VfsError::new(VfsErrorKind::OsError, "vfs.base_dir"))?;
        let user_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.clone());

        Ok(Self {
            state: Mutex::new(State {
                search_path: Vec::new(),
                write_dir: None,
            }),
            archivers: RwLock::new(vec![Arc::new(DirArchiver::new())]),
            allow_symlinks: AtomicBool::new(false),
            base_dir,
            user_dir,
        })
    }

    // ---- archiver registry -------------------------------------------------

    pub fn register_archiver(&self, archiver: Arc<dyn Archiver>) -> VfsResult<()> {
        let mut archivers = self.archivers.write();
        let ext = &archiver.info().extension;
        if archivers
            .iter()
            .any(|a| path::eq_case_fold(&a.info().extension, ext))
        {
            return Err(VfsError::new(VfsErrorKind::Duplicate, "archiver.register"));
        }
        archivers.push(archiver);
        Ok(())
    }

    pub fn deregister_archiver(&self, extension: &str) -> VfsResult<()> {
        // Lock order everywhere is state, then registry.
        let state = self.state.lock();
        let mut archivers = self.archivers.write();
        let idx = archivers
            .iter()
            .position(|a| path::eq_case_fold(&a.info().extension, extension))
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotFound, "archiver.deregister"))?;

        let in_use = state
            .search_path
            .iter()
            .chain(state.write_dir.as_ref())
            .any(|m| Arc::ptr_eq(&m.archiver, &archivers[idx]));
        if in_use {
            return Err(VfsError::new(
                VfsErrorKind::FilesStillOpen,
                "archiver.deregister.in_use",
            ));
        }
        archivers.remove(idx);
        Ok(())
    }

    /// Descriptions of the registered archive formats. The real-directory
    /// backend is implied and not listed.
    pub fn supported_archivers(&self) -> Vec<ArchiverInfo> {
        self.archivers
            .read()
            .iter()
            .filter(|a| !a.info().extension.is_empty())
            .map(|a| a.info().clone())
            .collect()
    }

    // ---- directories -------------------------------------------------------

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// Per-user writable directory for `org`/`app`, created on demand.
    pub fn pref_dir(&self, org: &str, app: &str) -> VfsResult<PathBuf> {
        let base = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.user_dir.join(".local").join("share"));
        let pref = base.join(org).join(app);
        crate::error::io_result("vfs.pref_dir", fs::create_dir_all(&pref))?;
        Ok(pref)
    }

    pub fn write_dir(&self) -> Option<String> {
        self.state.lock().write_dir.as_ref().map(|m| m.dir_name.clone())
    }

    /// Replace the writable overlay. Fails with `FilesStillOpen` while write
    /// handles into the old one are live. `None` just discards it.
    pub fn set_write_dir(&self, new_dir: Option<&str>) -> VfsResult<()> {
        let mut state = self.state.lock();
        if let Some(old) = &state.write_dir {
            if old.open_handles() > 0 {
                return Err(VfsError::new(
                    VfsErrorKind::FilesStillOpen,
                    "write_dir.busy",
                ));
            }
            state.write_dir = None;
        }
        if let Some(new_dir) = new_dir {
            let archivers = self.archivers.read();
            let (archive, archiver) = mount::open_archive(&archivers, None, new_dir, true)?;
            state.write_dir = Some(Mount {
                archive,
                archiver,
                dir_name: new_dir.to_owned(),
                mount_point: None,
                root: None,
                token: Arc::new(MountToken),
            });
            debug!(dir = new_dir, "write dir set");
        }
        Ok(())
    }

    // ---- symlink policy ----------------------------------------------------

    pub fn permit_symbolic_links(&self, allow: bool) {
        self.allow_symlinks.store(allow, Ordering::Release);
    }

    pub fn symbolic_links_permitted(&self) -> bool {
        self.allow_symlinks.load(Ordering::Acquire)
    }

    // ---- mounting ----------------------------------------------------------

    /// Mount a directory or archive file from disk.
    pub fn mount(&self, new_dir: &str, mount_point: Option<&str>, append: bool) -> VfsResult<()> {
        self.do_mount(None, new_dir, mount_point, append)
    }

    /// Mount an archive held in memory. `name` identifies the mount for
    /// `unmount` and `get_real_dir`.
    pub fn mount_memory(
        &self,
        buf: impl Into<Arc<[u8]>>,
        name: &str,
        mount_point: Option<&str>,
        append: bool,
    ) -> VfsResult<()> {
        let io = Box::new(MemoryIo::new(buf));
        self.do_mount(Some(io), name, mount_point, append)
    }

    /// Mount an archive that is itself an open handle, e.g. a `.pak` inside
    /// an already-mounted `.grp`. Takes ownership of the handle.
    pub fn mount_handle(
        &self,
        file: VfsFile,
        name: &str,
        mount_point: Option<&str>,
        append: bool,
    ) -> VfsResult<()> {
        let io = Box::new(HandleIo::new(file));
        self.do_mount(Some(io), name, mount_point, append)
    }

    fn do_mount(
        &self,
        io: Option<Box<dyn Io>>,
        name: &str,
        mount_point: Option<&str>,
        append: bool,
    ) -> VfsResult<()> {
        let mount_point = mount::normalize_mount_point(mount_point)?;

        let mut state = self.state.lock();
        if state.search_path.iter().any(|m| m.dir_name == name) {
            return Ok(());
        }

        let archivers = self.archivers.read();
        let (archive, archiver) = mount::open_archive(&archivers, io, name, false)?;
        drop(archivers);

        debug!(
            source = name,
            mount_point = mount_point.as_deref().unwrap_or("/"),
            append,
            "mounted"
        );
        let mount = Mount {
            archive,
            archiver,
            dir_name: name.to_owned(),
            mount_point,
            root: None,
            token: Arc::new(MountToken),
        };
        if append {
            state.search_path.push(mount);
        } else {
            state.search_path.insert(0, mount);
        }
        Ok(())
    }

    pub fn unmount(&self, old_dir: &str) -> VfsResult<()> {
        let mut state = self.state.lock();
        let idx = state
            .search_path
            .iter()
            .position(|m| m.dir_name == old_dir)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotMounted, "unmount"))?;
        if state.search_path[idx].open_handles() > 0 {
            return Err(VfsError::new(VfsErrorKind::FilesStillOpen, "unmount.busy"));
        }
        state.search_path.remove(idx);
        debug!(source = old_dir, "unmounted");
        Ok(())
    }

    /// Re-anchor a mounted archive at `subdir` inside itself; `None` or
    /// `"/"` restores the archive's own root.
    pub fn set_root(&self, archive: &str, subdir: Option<&str>) -> VfsResult<()> {
        let mut state = self.state.lock();
        let mount = state
            .search_path
            .iter_mut()
            .find(|m| m.dir_name == archive)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotMounted, "set_root"))?;
        mount.root = match subdir {
            None | Some("/") => None,
            Some(subdir) => {
                let clean = path::sanitize(subdir)?;
                if clean.is_empty() {
                    None
                } else {
                    Some(clean)
                }
            }
        };
        Ok(())
    }

    /// Where `dir` is grafted into the virtual tree (`"/"` when at the root).
    pub fn mount_point(&self, dir: &str) -> VfsResult<String> {
        let state = self.state.lock();
        let mount = state
            .search_path
            .iter()
            .find(|m| m.dir_name == dir)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotMounted, "mount_point"))?;
        Ok(mount
            .mount_point
            .clone()
            .unwrap_or_else(|| "/".to_owned()))
    }

    pub fn search_path(&self) -> Vec<String> {
        self.state
            .lock()
            .search_path
            .iter()
            .map(|m| m.dir_name.clone())
            .collect()
    }

    // ---- path verification -------------------------------------------------

    /// Check `fname` against one mount: strip the mount point, prepend the
    /// sub-root, and, when symlinks are forbidden and the backend can
    /// contain them, stat every path prefix to reject links. Returns the
    /// mount-relative path to hand the backend.
    fn verify_path(&self, mount: &Mount, fname: &str, allow_missing: bool) -> VfsResult<String> {
        let mut rel = fname;
        if let Some(mp) = &mount.mount_point {
            let bare = &mp[..mp.len() - 1];
            if rel == bare {
                rel = "";
            } else if let Some(rest) = rel.strip_prefix(mp.as_str()) {
                rel = rest;
            } else {
                return Err(VfsError::new(VfsErrorKind::NotFound, "verify.mount_point"));
            }
        }

        let full = match &mount.root {
            Some(root) if rel.is_empty() => root.clone(),
            Some(root) => format!("{root}/{rel}"),
            None => rel.to_owned(),
        };

        if !self.symbolic_links_permitted() && mount.archiver.info().supports_symlinks() {
            let mut start = 0;
            loop {
                let end = full[start..].find('/').map(|i| start + i);
                let prefix = &full[..end.unwrap_or(full.len())];
                match mount.archive.stat(prefix) {
                    Ok(st) if st.file_type == FileType::Symlink => {
                        return Err(VfsError::new(
                            VfsErrorKind::SymlinkForbidden,
                            "verify.symlink",
                        ));
                    }
                    Ok(_) => {}
                    Err(err) if err.kind() == VfsErrorKind::NotFound => {
                        // A missing final segment may be about to be created.
                        if end.is_none() || allow_missing {
                            break;
                        }
                        return Err(err);
                    }
                    Err(err) => return Err(err),
                }
                match end {
                    Some(e) => start = e + 1,
                    None => break,
                }
            }
        }

        Ok(full)
    }

    // ---- read side ---------------------------------------------------------

    /// Open the first match for `path` across the search path.
    pub fn open_read(&self, path: &str) -> VfsResult<VfsFile> {
        let fname = path::sanitize(path)?;
        let state = self.state.lock();
        let mut last_err = None;
        for mount in &state.search_path {
            match self
                .verify_path(mount, &fname, false)
                .and_then(|arc| mount.archive.open_read(&arc))
            {
                Ok(io) => return Ok(VfsFile::new(io, true, mount.token.clone())),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| VfsError::new(VfsErrorKind::NotFound, "open_read")))
    }

    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        let fname = path::sanitize(path)?;
        let state = self.state.lock();

        if fname.is_empty() {
            // The virtual root always exists; writable iff a write dir is set.
            return Ok(Stat {
                file_type: FileType::Directory,
                size: 0,
                readonly: state.write_dir.is_none(),
                ..Stat::default()
            });
        }

        let mut last_err = None;
        for mount in &state.search_path {
            if mount
                .mount_point
                .as_deref()
                .is_some_and(|mp| part_of_mount_point(mp, &fname))
            {
                return Ok(Stat {
                    file_type: FileType::Directory,
                    size: 0,
                    readonly: true,
                    ..Stat::default()
                });
            }
            match self.verify_path(mount, &fname, false) {
                Ok(arc) => match mount.archive.stat(&arc) {
                    Ok(st) => return Ok(st),
                    Err(err) if err.kind() == VfsErrorKind::NotFound => last_err = Some(err),
                    Err(err) => return Err(err),
                },
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| VfsError::new(VfsErrorKind::NotFound, "stat")))
    }

    /// Name of the mount that would satisfy `path`, if any.
    pub fn real_dir(&self, path: &str) -> Option<String> {
        let fname = path::sanitize(path).ok()?;
        let state = self.state.lock();
        for mount in &state.search_path {
            if mount
                .mount_point
                .as_deref()
                .is_some_and(|mp| part_of_mount_point(mp, &fname))
            {
                return Some(mount.dir_name.clone());
            }
            if let Ok(arc) = self.verify_path(mount, &fname, false) {
                if mount.archive.stat(&arc).is_ok() {
                    return Some(mount.dir_name.clone());
                }
            }
        }
        None
    }

    pub fn exists(&self, path: &str) -> bool {
        let fname = match path::sanitize(path) {
            Ok(fname) => fname,
            Err(_) => return false,
        };
        if fname.is_empty() {
            return true;
        }
        self.real_dir(path).is_some()
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.stat(path)
            .map(|st| st.file_type == FileType::Directory)
            .unwrap_or(false)
    }

    pub fn is_symbolic_link(&self, path: &str) -> bool {
        self.stat(path)
            .map(|st| st.file_type == FileType::Symlink)
            .unwrap_or(false)
    }

    pub fn last_mod_time(&self, path: &str) -> VfsResult<i64> {
        Ok(self.stat(path)?.mtime)
    }

    // ---- enumeration -------------------------------------------------------

    /// Walk the entries of a virtual directory across every mount that
    /// contributes to it. Runs under the state lock: the callback must not
    /// call back into this `Vfs`.
    pub fn enumerate<F>(&self, path: &str, mut callback: F) -> VfsResult<()>
    where
        F: FnMut(&str) -> VfsResult<Enumerate>,
    {
        let fname = path::sanitize(path)?;
        let state = self.state.lock();
        let filter_symlinks = !self.symbolic_links_permitted();

        for mount in &state.search_path {
            if mount
                .mount_point
                .as_deref()
                .is_some_and(|mp| part_of_mount_point(mp, &fname))
            {
                // Synthesize the next mount-point segment below `fname`.
                let mp = mount.mount_point.as_deref().unwrap_or("");
                let rest = if fname.is_empty() {
                    mp
                } else {
                    &mp[fname.len() + 1..]
                };
                let segment = rest.split('/').next().unwrap_or(rest);
                match callback(segment) {
                    Ok(Enumerate::Continue) => continue,
                    Ok(Enumerate::Stop) => return Ok(()),
                    Err(err) => {
                        return Err(VfsError::app_callback("enumerate.mount_point", err))
                    }
                }
            }

            let Ok(arc) = self.verify_path(mount, &fname, false) else {
                continue;
            };
            match mount.archive.stat(&arc) {
                Ok(st) if st.file_type == FileType::Directory => {}
                _ => continue,
            }

            let verdict = if filter_symlinks && mount.archiver.info().supports_symlinks() {
                let mut filtered = |name: &str| -> VfsResult<Enumerate> {
                    let full = if arc.is_empty() {
                        name.to_owned()
                    } else {
                        format!("{arc}/{name}")
                    };
                    if mount.archive.stat(&full)?.file_type == FileType::Symlink {
                        return Ok(Enumerate::Continue);
                    }
                    callback(name)
                };
                mount.archive.enumerate(&arc, &mut filtered)?
            } else {
                mount.archive.enumerate(&arc, &mut callback)?
            };
            if verdict == Enumerate::Stop {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Sorted, deduplicated names in a virtual directory.
    pub fn enumerate_files(&self, path: &str) -> VfsResult<Vec<String>> {
        let mut list: Vec<String> = Vec::new();
        self.enumerate(path, |name| {
            if let Err(pos) = list.binary_search_by(|e| e.as_str().cmp(name)) {
                list.insert(pos, name.to_owned());
            }
            Ok(Enumerate::Continue)
        })?;
        Ok(list)
    }

    // ---- write side --------------------------------------------------------

    fn with_write_dir<T>(
        &self,
        context: &'static str,
        f: impl FnOnce(&Mount, &Self) -> VfsResult<T>,
    ) -> VfsResult<T> {
        let state = self.state.lock();
        let mount = state
            .write_dir
            .as_ref()
            .ok_or_else(|| VfsError::new(VfsErrorKind::NoWriteDir, context))?;
        f(mount, self)
    }

    pub fn open_write(&self, path: &str) -> VfsResult<VfsFile> {
        self.do_open_write(path, false)
    }

    pub fn open_append(&self, path: &str) -> VfsResult<VfsFile> {
        self.do_open_write(path, true)
    }

    fn do_open_write(&self, path: &str, appending: bool) -> VfsResult<VfsFile> {
        let fname = path::sanitize(path)?;
        self.with_write_dir("open_write", |mount, vfs| {
            let arc = vfs.verify_path(mount, &fname, false)?;
            let io = if appending {
                mount.archive.open_append(&arc)?
            } else {
                mount.archive.open_write(&arc)?
            };
            Ok(VfsFile::new(io, false, mount.token.clone()))
        })
    }

    /// Create a directory (and any missing parents) in the write dir.
    pub fn mkdir(&self, path: &str) -> VfsResult<()> {
        let dname = path::sanitize(path)?;
        self.with_write_dir("mkdir", |mount, vfs| {
            let arc = vfs.verify_path(mount, &dname, true)?;
            let mut missing_parent = false;
            let mut start = 0;
            loop {
                let end = arc[start..].find('/').map(|i| start + i);
                let prefix = &arc[..end.unwrap_or(arc.len())];
                if missing_parent {
                    mount.archive.mkdir(prefix)?;
                } else {
                    match mount.archive.stat(prefix) {
                        Ok(st)
                            if st.file_type == FileType::Directory
                                || st.file_type == FileType::Symlink => {}
                        Ok(_) => {
                            return Err(VfsError::new(VfsErrorKind::Duplicate, "mkdir.occupied"))
                        }
                        Err(err) if err.kind() == VfsErrorKind::NotFound => {
                            missing_parent = true;
                            mount.archive.mkdir(prefix)?;
                        }
                        Err(err) => return Err(err),
                    }
                }
                match end {
                    Some(e) => start = e + 1,
                    None => break,
                }
            }
            Ok(())
        })
    }

    /// Remove a file or empty directory from the write dir.
    pub fn remove(&self, path: &str) -> VfsResult<()> {
        let fname = path::sanitize(path)?;
        self.with_write_dir("remove", |mount, vfs| {
            let arc = vfs.verify_path(mount, &fname, false)?;
            mount.archive.remove(&arc)
        })
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Tear down every mount. Fails with `FilesStillOpen` while write
    /// handles are live; read handles keep working on their own duplicated
    /// streams.
    pub fn shutdown(&self) -> VfsResult<()> {
        let mut state = self.state.lock();
        if let Some(wd) = &state.write_dir {
            if wd.open_handles() > 0 {
                return Err(VfsError::new(
                    VfsErrorKind::FilesStillOpen,
                    "shutdown.write_handles",
                ));
            }
        }
        state.write_dir = None;
        state.search_path.clear();
        Ok(())
    }
}
