//! Build engine groupfile (GRP) support.
//!
//! The format, in Ken Silverman's own words, is as simple as it gets: the
//! first 12 bytes are the string `KenSilverman`, the next 4 the number of
//! packed files, then a 16-byte record per file (12-byte space-padded name,
//! 4-byte size). The raw file data follows back to back in record order, so
//! the first entry's bytes start at `16 + 16 * count`.

use packfs_core::{
    read_all, Archive, Archiver, ArchiverCaps, ArchiverInfo, Io, UnpackedArchive, VfsError,
    VfsErrorKind, VfsResult,
};

use crate::{fixed_name, read_u32_le};

const SIGNATURE: &[u8; 12] = b"KenSilverman";

pub struct GrpArchiver {
    info: ArchiverInfo,
}

impl GrpArchiver {
    pub fn new() -> Self {
        Self {
            info: ArchiverInfo {
                extension: "grp".into(),
                description: "Build engine Groupfile format".into(),
                author: "packfs contributors".into(),
                url: "https://github.com/packfs/packfs".into(),
                caps: ArchiverCaps::empty(),
            },
        }
    }
}

impl Default for GrpArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for GrpArchiver {
    fn info(&self) -> &ArchiverInfo {
        &self.info
    }

    fn claims(&self, io: Option<&mut dyn Io>, _name: &str) -> VfsResult<bool> {
        let Some(io) = io else {
            return Ok(false);
        };
        let mut sig = [0u8; 12];
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
            return Err(VfsError::new(VfsErrorKind::ReadOnly, "grp.open_archive"));
        }
        let mut io = io
            .ok_or_else(|| VfsError::new(VfsErrorKind::Unsupported, "grp.no_stream"))?;

        let mut sig = [0u8; 12];
        read_all(io.as_mut(), &mut sig)?;
        if &sig != SIGNATURE {
            return Err(VfsError::new(VfsErrorKind::Unsupported, "grp.signature"));
        }
        let count = read_u32_le(io.as_mut())?;

        let mut entries = Vec::new();
        let mut pos = 16u64 + 16 * count as u64;
        for _ in 0..count {
            let mut raw = [0u8; 12];
            read_all(io.as_mut(), &mut raw)?;
            let size = read_u32_le(io.as_mut())? as u64;
            entries.push((fixed_name(&raw, true), pos, size));
            pos += size;
        }

        let mut archive = UnpackedArchive::new(io, false, true);
        for (name, start, size) in entries {
            archive.add_entry(&name, false, -1, -1, start, size)?;
        }
        Ok(Box::new(archive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packfs_core::MemoryIo;

    fn sample_grp() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(SIGNATURE);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(b"HELLO.TXT   ");
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.extend_from_slice(b"DATA.BIN    ");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"world\x01\x02\x03");
        bytes
    }

    fn open(bytes: Vec<u8>) -> VfsResult<Box<dyn Archive>> {
        GrpArchiver::new().open_archive(Some(Box::new(MemoryIo::new(bytes))), "test.grp", false)
    }

    #[test]
    fn reads_packed_entries() {
        let archive = open(sample_grp()).expect("open");

        let mut io = archive.open_read("HELLO.TXT").expect("open entry");
        let mut buf = [0u8; 5];
        read_all(io.as_mut(), &mut buf).expect("read");
        assert_eq!(&buf, b"world");
        assert_eq!(io.read(&mut buf).expect("eof"), 0);

        assert_eq!(archive.stat("DATA.BIN").expect("stat").size, 3);
        let mut io = archive.open_read("DATA.BIN").expect("open entry");
        let mut buf = [0u8; 3];
        read_all(io.as_mut(), &mut buf).expect("read");
        assert_eq!(&buf, b"\x01\x02\x03");
    }

    #[test]
    fn names_fold_ascii_case() {
        let archive = open(sample_grp()).expect("open");
        assert!(archive.open_read("hello.txt").is_ok());
        assert!(archive.open_read("Hello.Txt").is_ok());
        assert_eq!(
            archive.open_read("missing.txt").expect_err("missing").kind(),
            VfsErrorKind::NotFound
        );
    }

    #[test]
    fn declines_foreign_signatures() {
        let archiver = GrpArchiver::new();
        let mut io = MemoryIo::new(&b"PK\x03\x04 definitely not a groupfile"[..]);
        assert!(!archiver.claims(Some(&mut io), "a.grp").expect("claims"));

        let err = open(b"KenSilverma?............".to_vec()).expect_err("bad sig");
        assert_eq!(err.kind(), VfsErrorKind::Unsupported);
    }

    #[test]
    fn truncated_directory_fails() {
        let mut bytes = sample_grp();
        bytes.truncate(20); // Signature + count, but no records.
        let err = open(bytes).expect_err("truncated");
        assert_eq!(err.kind(), VfsErrorKind::Io);
    }

    #[test]
    fn rejects_write_opens() {
        let err = GrpArchiver::new()
            .open_archive(
                Some(Box::new(MemoryIo::new(sample_grp()))),
                "test.grp",
                true,
            )
            .expect_err("for writing");
        assert_eq!(err.kind(), VfsErrorKind::ReadOnly);
    }
}
