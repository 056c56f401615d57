//! Quake I/II packfile (QPAK) support.
//!
//! Header: 4-byte `PACK` signature, directory offset, directory length.
//! The directory is an array of 64-byte records (56-byte zero-padded name
//! with `/` separators, 4-byte position, 4-byte size), so a length that is
//! not a multiple of 64 marks a corrupted archive. Quake 3 and later use
//! PkZip archives instead.

use packfs_core::{
    read_all, Archive, Archiver, ArchiverCaps, ArchiverInfo, Io, UnpackedArchive, VfsError,
    VfsErrorKind, VfsResult,
};

use crate::{fixed_name, read_u32_le};

const SIGNATURE: &[u8; 4] = b"PACK";

pub struct QpakArchiver {
    info: ArchiverInfo,
}

impl QpakArchiver {
    pub fn new() -> Self {
        Self {
            info: ArchiverInfo {
                extension: "pak".into(),
                description: "Quake I/II format".into(),
                author: "packfs contributors".into(),
                url: "https://github.com/packfs/packfs".into(),
                caps: ArchiverCaps::empty(),
            },
        }
    }
}

impl Default for QpakArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for QpakArchiver {
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
            return Err(VfsError::new(VfsErrorKind::ReadOnly, "qpak.open_archive"));
        }
        let mut io = io
            .ok_or_else(|| VfsError::new(VfsErrorKind::Unsupported, "qpak.no_stream"))?;

        let mut sig = [0u8; 4];
        read_all(io.as_mut(), &mut sig)?;
        if &sig != SIGNATURE {
            return Err(VfsError::new(VfsErrorKind::Unsupported, "qpak.signature"));
        }
        let dir_pos = read_u32_le(io.as_mut())?;
        let dir_len = read_u32_le(io.as_mut())?;
        if dir_len % 64 != 0 {
            return Err(VfsError::new(VfsErrorKind::Corrupt, "qpak.directory_len"));
        }
        let count = dir_len / 64;
        io.seek(dir_pos as u64)?;

        let mut entries = Vec::new();
        for _ in 0..count {
            let mut raw = [0u8; 56];
            read_all(io.as_mut(), &mut raw)?;
            let pos = read_u32_le(io.as_mut())? as u64;
            let size = read_u32_le(io.as_mut())? as u64;
            entries.push((fixed_name(&raw, false), pos, size));
        }

        let mut archive = UnpackedArchive::new(io, true, false);
        for (name, start, size) in entries {
            archive.add_entry(&name, false, -1, -1, start, size)?;
        }
        Ok(Box::new(archive))
    }
}
