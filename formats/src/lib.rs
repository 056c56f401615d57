//! Archive format adapters.
//!
//! Each adapter validates its format's signature, walks the directory
//! record and feeds entries into a [`packfs_core::UnpackedArchive`]; the
//! framework does the rest. All multibyte header fields are little-endian.

mod grp;
mod mvl;
mod qpak;

pub use grp::GrpArchiver;
pub use mvl::MvlArchiver;
pub use qpak::QpakArchiver;

use packfs_core::{read_all, Io, VfsResult};

pub(crate) fn read_u32_le(io: &mut dyn Io) -> VfsResult<u32> {
    let mut bytes = [0u8; 4];
    read_all(io, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Decode a fixed-width name field. Stops at the first NUL (and optionally
/// the first space, for space-padded formats).
pub(crate) fn fixed_name(raw: &[u8], space_padded: bool) -> String {
    let end = raw
        .iter()
        .position(|&b| b == 0 || (space_padded && b == b' '))
        .unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
