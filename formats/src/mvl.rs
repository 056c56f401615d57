//! Descent II Movielib (MVL) support.
//!
//! Four-byte `DMVL` signature, a file count, then a 17-byte record per file
//! (13-byte zero-padded name, 4-byte size); movie data follows packed in
//! record order starting at `8 + 17 * count`.

use packfs_core::{
    read_all, Archive, Archiver, ArchiverCaps, ArchiverInfo, Io, UnpackedArchive, VfsError,
    VfsErrorKind, VfsResult,
};

use crate::{fixed_name, read_u32_le};

const SIGNATURE: &[u8; 4] = b"DMVL";

pub struct MvlArchiver {
    info: ArchiverInfo,
}

impl MvlArchiver {
    pub fn new() -> Self {
        Self {
            info: ArchiverInfo {
                extension: "mvl".into(),
                description: "Descent II Movielib format".into(),
                author: "packfs contributors".into(),
                url: "https://github.com/packfs/packfs".into(),
                caps: ArchiverCaps::empty(),
            },
        }
    }
}

impl Default for MvlArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for MvlArchiver {
    fn info(&self) -> &ArchiverInfo {
        &self.info
    }

    fn claims(&self, io: Option<&mut dyn Io>, _name: &str) -> VfsResult<bool> {
        let Some(io) = io else {
            return Ok(false);
        };
        let mut sig = [0u8; 4];
        read_all(io, &mut sig)?;
        Ok(&sig == SIGNATURE)
    }

    fn open_archive(
        &self,
        io: Option<Box<dyn Io>>,
        _name: &str,
        for_writing: bool,
    ) -> VfsResult<Box<dyn Archive>> {
        if for_writing {
            return Err(VfsError::new(VfsErrorKind::ReadOnly, "mvl.open_archive"));
        }
        let mut io = io
            .ok_or_else(|| VfsError::new(VfsErrorKind::Unsupported, "mvl.no_stream"))?;

        let mut sig = [0u8; 4];
        read_all(io.as_mut(), &mut sig)?;
        if &sig != SIGNATURE {
            return Err(VfsError::new(VfsErrorKind::Unsupported, "mvl.signature"));
        }
        let count = read_u32_le(io.as_mut())?;

        let mut entries = Vec::new();
        let mut pos = 8u64 + 17 * count as u64;
        for _ in 0..count {
            let mut raw = [0u8; 13];
            read_all(io.as_mut(), &mut raw)?;
            let size = read_u32_le(io.as_mut())? as u64;
            entries.push((fixed_name(&raw, false), pos, size));
            pos += size;
        }

        let mut archive = UnpackedArchive::new(io, false, true);
        for (name, start, size) in entries {
            archive.add_entry(&name, false, -1, -1, start, size)?;
        }
        Ok(Box::new(archive))
    }
}
