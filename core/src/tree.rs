//! Hashed directory tree index.
//!
//! Archives with a flat directory record use this to answer path lookups and
//! enumeration. Entries live in an arena and refer to each other by `u32`
//! handles: each node carries its full in-archive path, a hash-bucket chain
//! link and child/sibling links. Inserting a path creates any missing
//! ancestor directories. Lookups splice the hit to the front of its bucket to
//! favor temporal locality.

use crate::archiver::Enumerate;
use crate::error::{VfsError, VfsErrorKind, VfsResult};
use crate::path::{eq_case_fold, hash_string, hash_string_fold, hash_string_fold_ascii};

const NIL: u32 = u32::MAX;
const BUCKETS: usize = 64;

struct Node<T> {
    path: Box<str>,
    is_dir: bool,
    hash_next: u32,
    first_child: u32,
    next_sibling: u32,
    data: T,
}

pub struct DirTree<T> {
    entries: Vec<Node<T>>,
    buckets: [u32; BUCKETS],
    case_sensitive: bool,
    only_usascii: bool,
}

impl<T: Default> DirTree<T> {
    /// `only_usascii` selects one-byte `A..Z` folding for the many legacy
    /// formats whose names were never UTF-8; ignored when `case_sensitive`.
    pub fn new(case_sensitive: bool, only_usascii: bool) -> Self {
        let root = Node {
            path: "/".into(),
            is_dir: true,
            hash_next: NIL,
            first_child: NIL,
            next_sibling: NIL,
            data: T::default(),
        };
        Self {
            entries: vec![root],
            buckets: [NIL; BUCKETS],
            case_sensitive,
            only_usascii,
        }
    }

    /// Index an entry under its full path, creating missing ancestors as
    /// directories. Returns the existing index if the path is already
    /// present.
    pub fn add(&mut self, path: &str, is_dir: bool) -> VfsResult<u32> {
        if let Some(idx) = self.find(path) {
            return Ok(idx);
        }
        let parent = self.ensure_ancestors(path)?;

        let idx = self.entries.len() as u32;
        let bucket = self.bucket_of(path);
        let node = Node {
            path: path.into(),
            is_dir,
            hash_next: self.buckets[bucket],
            first_child: NIL,
            next_sibling: self.entries[parent as usize].first_child,
            data: T::default(),
        };
        self.entries.push(node);
        self.buckets[bucket] = idx;
        self.entries[parent as usize].first_child = idx;
        Ok(idx)
    }

    fn ensure_ancestors(&mut self, path: &str) -> VfsResult<u32> {
        let Some((parent_path, _)) = path.rsplit_once('/') else {
            return Ok(0);
        };
        if let Some(idx) = self.find(parent_path) {
            if !self.entries[idx as usize].is_dir {
                return Err(VfsError::new(VfsErrorKind::Corrupt, "tree.ancestor_is_file"));
            }
            return Ok(idx);
        }
        self.add(parent_path, true)
    }
}

impl<T> DirTree<T> {
    fn bucket_of(&self, path: &str) -> usize {
        let hash = if self.case_sensitive {
            hash_string(path)
        } else if self.only_usascii {
            hash_string_fold_ascii(path)
        } else {
            hash_string_fold(path)
        };
        hash as usize % BUCKETS
    }

    fn paths_equal(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else if self.only_usascii {
            a.eq_ignore_ascii_case(b)
        } else {
            eq_case_fold(a, b)
        }
    }

    /// Look up a sanitized path. The empty path is the root. A hit moves the
    /// entry to the front of its hash bucket.
    pub fn find(&mut self, path: &str) -> Option<u32> {
        if path.is_empty() {
            return Some(0);
        }
        let bucket = self.bucket_of(path);
        let mut prev = NIL;
        let mut cur = self.buckets[bucket];
        while cur != NIL {
            if self.paths_equal(&self.entries[cur as usize].path, path) {
                if prev != NIL {
                    let next = self.entries[cur as usize].hash_next;
                    self.entries[prev as usize].hash_next = next;
                    self.entries[cur as usize].hash_next = self.buckets[bucket];
                    self.buckets[bucket] = cur;
                }
                return Some(cur);
            }
            prev = cur;
            cur = self.entries[cur as usize].hash_next;
        }
        None
    }

    pub fn is_dir(&self, idx: u32) -> bool {
        self.entries[idx as usize].is_dir
    }

    pub fn full_path(&self, idx: u32) -> &str {
        &self.entries[idx as usize].path
    }

    pub fn data(&self, idx: u32) -> &T {
        &self.entries[idx as usize].data
    }

    pub fn data_mut(&mut self, idx: u32) -> &mut T {
        &mut self.entries[idx as usize].data
    }

    /// Yield the final path segment of each direct child of `dir` until the
    /// callback stops or fails.
    pub fn enumerate(
        &mut self,
        dir: &str,
        callback: &mut dyn FnMut(&str) -> VfsResult<Enumerate>,
    ) -> VfsResult<Enumerate> {
        let idx = self
            .find(dir)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotFound, "tree.enumerate"))?;
        let mut child = self.entries[idx as usize].first_child;
        while child != NIL {
            let path = &self.entries[child as usize].path;
            let name = path.rsplit('/').next().unwrap_or(path);
            match callback(name) {
                Ok(Enumerate::Continue) => {}
                Ok(Enumerate::Stop) => return Ok(Enumerate::Stop),
                Err(err) => return Err(VfsError::app_callback("tree.enumerate", err)),
            }
            child = self.entries[child as usize].next_sibling;
        }
        Ok(Enumerate::Continue)
    }
}
