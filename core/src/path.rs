//! Path sanitation and matching.
//!
//! Every path entering the VFS is platform-independent `/`-notation. The
//! sanitizer cleans the string without touching any filesystem: it strips
//! leading and trailing separators, collapses duplicates and rejects the
//! characters and segments that could escape a mount.

use crate::error::{VfsError, VfsErrorKind, VfsResult};

/// Clean a platform-independent path. Fails with `BadFilename` on `.` or
/// `..` segments and on `\` or `:` anywhere.
pub fn sanitize(src: &str) -> VfsResult<String> {
    let mut out = String::with_capacity(src.len());
    for segment in src.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." {
            return Err(VfsError::new(VfsErrorKind::BadFilename, "path.dot_segment"));
        }
        if segment.contains(['\\', ':']) {
            return Err(VfsError::new(VfsErrorKind::BadFilename, "path.bad_char"));
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    Ok(out)
}

/// Is `path` a proper interior prefix of `mount_point`?
///
/// `mount_point` is sanitized and ends with `/`. The empty path (the virtual
/// root) always qualifies; the complete mount point itself and anything below
/// it do not; those resolve inside the archive instead.
pub fn part_of_mount_point(mount_point: &str, path: &str) -> bool {
    if path.is_empty() {
        return true;
    }
    let len = path.len();
    if len + 1 >= mount_point.len() {
        return false;
    }
    mount_point.as_bytes()[len] == b'/' && mount_point[..len] == *path
}

/// Filename extension after the last `.`, if any.
pub fn extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Case-insensitive comparison folding full Unicode.
pub fn eq_case_fold(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

const HASH_SEED: u32 = 5381;

#[inline]
fn hash_step(h: u32, c: u32) -> u32 {
    (h << 5).wrapping_add(h) ^ c
}

/// Stable string hash (djb2 xor variant) over raw bytes.
pub fn hash_string(s: &str) -> u32 {
    s.bytes().fold(HASH_SEED, |h, b| hash_step(h, b as u32))
}

/// Hash with ASCII-only case folding; legacy formats store one-byte names
/// where only `A..Z` fold.
pub fn hash_string_fold_ascii(s: &str) -> u32 {
    s.bytes()
        .fold(HASH_SEED, |h, b| hash_step(h, b.to_ascii_lowercase() as u32))
}

/// Hash with per-codepoint Unicode case folding.
pub fn hash_string_fold(s: &str) -> u32 {
    s.chars()
        .flat_map(char::to_lowercase)
        .fold(HASH_SEED, |h, c| hash_step(h, c as u32))
}
