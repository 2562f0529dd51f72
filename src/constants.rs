//! ECMA-119 constants shared across the decoder.

/// Logical sector size used by all conformant ISO 9660 images.
pub const SECTOR_SIZE: usize = 2048;

/// Byte offset of the volume descriptor set, i.e. sector 16.
pub const VOLUME_DESCRIPTOR_SET_START: u64 = 16 * SECTOR_SIZE as u64;

/// Standard identifier every volume descriptor must carry at offset +1.
pub const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

/// Maximum number of hops `vfs::resolve` will follow through Rock Ridge
/// symlinks before giving up with `Error::SymlinkLoop`.
pub const MAX_SYMLINK_HOPS: u32 = 20;

/// Maximum number of SUSP continuation areas (`CE` entries) a single
/// record's system-use chain may follow before it is treated as malformed.
pub const MAX_CE_HOPS: usize = 256;

/// Volume descriptor type tags (ECMA-119 §8.1).
pub mod volume_type {
    pub const BOOT_RECORD: u8 = 0;
    pub const PRIMARY: u8 = 1;
    pub const SUPPLEMENTARY: u8 = 2;
    pub const PARTITION: u8 = 3;
    pub const SET_TERMINATOR: u8 = 255;
}

/// Escape sequences (ECMA-119:1999 Annex) that signal a Joliet
/// supplementary volume descriptor, by UCS-2 level.
pub const JOLIET_ESCAPE_SEQUENCES: [[u8; 3]; 3] = [
    [0x25, 0x2F, 0x40], // Level 1
    [0x25, 0x2F, 0x43], // Level 2
    [0x25, 0x2F, 0x45], // Level 3
];
