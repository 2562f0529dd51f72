//! C4: System Use Sharing Protocol (SUSP) and Rock Ridge (RRIP) parsing.
//!
//! SUSP occupies the system-use area trailing each directory record's fixed
//! fields: a chain of `tag(2) length(1) version(1) payload` entries that may
//! hop out to a continuation area (`CE`) living elsewhere on the disc. This
//! module only decodes the chain; following a `CE` requires reading from the
//! backing stream, which callers provide via the `fetch_continuation`
//! closure so this module stays free of I/O concerns of its own.

use bitflags::bitflags;
use chrono::{DateTime, FixedOffset};
use log::{debug, trace, warn};

use crate::codec;
use crate::constants::MAX_CE_HOPS;
use crate::error::{Error, Result};

bitflags! {
    /// `st_mode`-equivalent bits carried by a `PX` entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PosixFileMode: u32 {
        const TYPE_SOCKET    = 0o0_140_000;
        const TYPE_SYMLINK   = 0o0_120_000;
        const TYPE_FILE      = 0o0_100_000;
        const TYPE_BLOCK_DEV = 0o0_060_000;
        const TYPE_DIRECTORY = 0o0_040_000;
        const TYPE_CHAR_DEV  = 0o0_020_000;
        const TYPE_PIPE      = 0o0_010_000;
        const PERMISSION_BITS = 0o7_777;
    }
}

impl PosixFileMode {
    pub fn is_symlink(&self) -> bool {
        self.intersection(Self::type_mask()) == Self::TYPE_SYMLINK
    }

    pub fn is_directory(&self) -> bool {
        self.intersection(Self::type_mask()) == Self::TYPE_DIRECTORY
    }

    fn type_mask() -> Self {
        Self::TYPE_SOCKET
            | Self::TYPE_SYMLINK
            | Self::TYPE_FILE
            | Self::TYPE_BLOCK_DEV
            | Self::TYPE_DIRECTORY
            | Self::TYPE_CHAR_DEV
            | Self::TYPE_PIPE
    }
}

bitflags! {
    /// Flags byte of an `NM` (alternate name) entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlternateNameFlags: u8 {
        const CONTINUE = 1 << 0;
        const CURRENT  = 1 << 1;
        const PARENT   = 1 << 2;
        const HOST     = 1 << 5;
    }
}

bitflags! {
    /// Flags byte preceding each component of an `SL` (symlink) entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymlinkComponentFlags: u8 {
        const CONTINUE     = 1 << 0;
        const CURRENT      = 1 << 1;
        const PARENT       = 1 << 2;
        const ROOT         = 1 << 3;
        const VOLUME_ROOT   = 1 << 4;
        const HOSTNAME     = 1 << 5;
    }
}

bitflags! {
    /// Flags byte of a `TF` (timestamp) entry selecting which fields follow.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimestampFlags: u8 {
        const CREATION   = 1 << 0;
        const MODIFY     = 1 << 1;
        const ACCESS     = 1 << 2;
        const ATTRIBUTES = 1 << 3;
        const BACKUP     = 1 << 4;
        const EXPIRATION = 1 << 5;
        const EFFECTIVE  = 1 << 6;
        const LONG_FORM  = 1 << 7;
    }
}

/// One component of an `SL` symlink target, prefixed by its own flags.
#[derive(Debug, Clone)]
pub struct SymlinkComponent {
    pub flags: SymlinkComponentFlags,
    pub content: String,
}

/// POSIX attributes decoded from a `PX` entry.
#[derive(Debug, Clone)]
pub struct PosixAttributes {
    pub mode: PosixFileMode,
    pub links: u32,
    pub uid: u32,
    pub gid: u32,
    pub inode: Option<u32>,
}

/// Alternate timestamps decoded from a `TF` entry.
#[derive(Debug, Clone, Default)]
pub struct Timestamps {
    pub creation: Option<DateTime<FixedOffset>>,
    pub modify: Option<DateTime<FixedOffset>>,
    pub access: Option<DateTime<FixedOffset>>,
    pub attributes: Option<DateTime<FixedOffset>>,
    pub backup: Option<DateTime<FixedOffset>>,
    pub expiration: Option<DateTime<FixedOffset>>,
    pub effective: Option<DateTime<FixedOffset>>,
}

/// A single decoded system-use entry.
#[derive(Debug, Clone)]
pub enum SuspEntry {
    /// `SP`: marks the presence of SUSP and how many leading bytes of every
    /// system-use area to skip.
    SharingProtocolIndicator { skip_bytes: u8 },
    /// `CE`: redirects the remainder of the chain to an out-of-record area.
    ContinuationArea { extent_lba: u32, offset: u32, length: u32 },
    /// `ER`: registers an extension identifier (`RRIP_1991A`, `IEEE_P1282`, ...).
    ExtensionReference { identifier: String },
    /// `RR`: legacy Rock Ridge marker (no identifier string, just a presence bit).
    LegacyRockRidgeMarker,
    /// `PX`: POSIX file attributes.
    PosixAttributes(PosixAttributes),
    /// `PN`: POSIX device major/minor numbers.
    DeviceNumber { major: u32, minor: u32 },
    /// `NM`: a fragment of the alternate (long) file name.
    AlternateName { flags: AlternateNameFlags, fragment: String },
    /// `SL`: a fragment of the symbolic link target.
    SymbolicLink { continues: bool, components: Vec<SymlinkComponent> },
    /// `TF`: alternate timestamps.
    Timestamps(Timestamps),
    /// `CL`: this entry has been relocated; its real content lives at `extent_lba`.
    ChildLink { extent_lba: u32 },
    /// `PL`: the parent of a relocated directory.
    ParentLink { extent_lba: u32 },
    /// `RE`: marks a directory as having been relocated.
    RelocatedDirectory,
    /// `ST`: explicit end of the system-use chain.
    Stop,
    /// Any tag not recognised above; preserved opaquely.
    Unknown { tag: [u8; 2], version: u8, data: Vec<u8> },
}

/// Magic bytes identifying the `SP` entry per SUSP §5.3.
const SP_MAGIC: [u8; 2] = [0xBE, 0xEF];

/// Fetches the bytes of a continuation area: `(extent_lba, offset, length) -> bytes`.
pub trait ContinuationFetcher {
    fn fetch(&mut self, extent_lba: u32, offset: u32, length: u32) -> Result<Vec<u8>>;
}

impl<F> ContinuationFetcher for F
where
    F: FnMut(u32, u32, u32) -> Result<Vec<u8>>,
{
    fn fetch(&mut self, extent_lba: u32, offset: u32, length: u32) -> Result<Vec<u8>> {
        self(extent_lba, offset, length)
    }
}

/// Walks the system-use chain starting at `system_use[skip_bytes..]`,
/// following `CE` continuation areas via `fetcher`.
///
/// Stops at a zero/undersized header, a `ST` entry, or after
/// [`MAX_CE_HOPS`] continuation hops (whichever comes first); the hop bound
/// and a per-chain visited set guard against a disc whose `CE` entries loop.
pub fn parse_chain(
    system_use: &[u8],
    skip_bytes: usize,
    fetcher: &mut dyn ContinuationFetcher,
) -> Result<Vec<SuspEntry>> {
    let mut entries = Vec::new();
    let mut visited: Vec<(u32, u32)> = Vec::new();
    let mut buf: Vec<u8> = system_use.get(skip_bytes..).unwrap_or(&[]).to_vec();
    let mut offset = 0usize;

    loop {
        if offset + 4 > buf.len() {
            break;
        }

        let tag = [buf[offset], buf[offset + 1]];
        let length = buf[offset + 2] as usize;
        let version = buf[offset + 3];

        if length < 4 || offset + length > buf.len() {
            trace!("susp chain stopped: entry at {offset} has invalid length {length}");
            break;
        }

        let payload = &buf[offset + 4..offset + length];

        match &tag {
            b"SP" => {
                if payload.len() >= 3 && payload[0..2] == SP_MAGIC {
                    entries.push(SuspEntry::SharingProtocolIndicator { skip_bytes: payload[2] });
                } else {
                    warn!("SP entry missing BE EF magic, ignoring");
                }
            }
            b"CE" => {
                if payload.len() < 24 {
                    return Err(Error::Malformed("CE entry shorter than 24 bytes".into()));
                }
                let extent_lba = codec::read_u32_both(&payload[0..8]);
                let ce_offset = codec::read_u32_both(&payload[8..16]);
                let length = codec::read_u32_both(&payload[16..24]);
                entries.push(SuspEntry::ContinuationArea {
                    extent_lba,
                    offset: ce_offset,
                    length,
                });

                if visited.contains(&(extent_lba, ce_offset)) {
                    return Err(Error::Malformed(
                        "SUSP continuation area chain loops back on itself".into(),
                    ));
                }
                if visited.len() >= MAX_CE_HOPS {
                    return Err(Error::Malformed(
                        "SUSP continuation area chain exceeded the hop bound".into(),
                    ));
                }
                visited.push((extent_lba, ce_offset));

                debug!("following SUSP continuation area at LBA {extent_lba} len {length}");
                buf = fetcher.fetch(extent_lba, ce_offset, length)?;
                offset = 0;
                continue;
            }
            b"ER" => {
                if let Some(identifier) = parse_er_identifier(payload) {
                    entries.push(SuspEntry::ExtensionReference { identifier });
                }
            }
            b"RR" => entries.push(SuspEntry::LegacyRockRidgeMarker),
            b"PX" => entries.push(SuspEntry::PosixAttributes(parse_px(payload)?)),
            b"PN" => {
                if payload.len() < 16 {
                    return Err(Error::Malformed("PN entry shorter than 16 bytes".into()));
                }
                entries.push(SuspEntry::DeviceNumber {
                    major: codec::read_u32_both(&payload[0..8]),
                    minor: codec::read_u32_both(&payload[8..16]),
                });
            }
            b"NM" => {
                if payload.is_empty() {
                    return Err(Error::Malformed("NM entry missing flags byte".into()));
                }
                let flags = AlternateNameFlags::from_bits_truncate(payload[0]);
                let fragment = String::from_utf8_lossy(&payload[1..]).into_owned();
                entries.push(SuspEntry::AlternateName { flags, fragment });
            }
            b"SL" => entries.push(parse_sl(payload)?),
            b"TF" => entries.push(SuspEntry::Timestamps(parse_tf(payload))),
            b"CL" => {
                if payload.len() < 8 {
                    return Err(Error::Malformed("CL entry shorter than 8 bytes".into()));
                }
                entries.push(SuspEntry::ChildLink {
                    extent_lba: codec::read_u32_both(&payload[0..8]),
                });
            }
            b"PL" => {
                if payload.len() < 8 {
                    return Err(Error::Malformed("PL entry shorter than 8 bytes".into()));
                }
                entries.push(SuspEntry::ParentLink {
                    extent_lba: codec::read_u32_both(&payload[0..8]),
                });
            }
            b"RE" => entries.push(SuspEntry::RelocatedDirectory),
            b"ST" => {
                entries.push(SuspEntry::Stop);
                break;
            }
            _ => entries.push(SuspEntry::Unknown {
                tag,
                version,
                data: payload.to_vec(),
            }),
        }

        offset += length;
    }

    Ok(entries)
}

fn parse_er_identifier(payload: &[u8]) -> Option<String> {
    if payload.len() < 3 {
        return None;
    }
    let id_len = payload[0] as usize;
    let description_len = payload[1] as usize;
    let source_len = payload[2] as usize;
    let start = 3;
    if start + id_len + description_len + source_len > payload.len() {
        return None;
    }
    Some(String::from_utf8_lossy(&payload[start..start + id_len]).into_owned())
}

fn parse_px(payload: &[u8]) -> Result<PosixAttributes> {
    if payload.len() < 32 {
        return Err(Error::Malformed("PX entry shorter than 32 bytes".into()));
    }
    let mode = PosixFileMode::from_bits_truncate(codec::read_u32_both(&payload[0..8]));
    let links = codec::read_u32_both(&payload[8..16]);
    let uid = codec::read_u32_both(&payload[16..24]);
    let gid = codec::read_u32_both(&payload[24..32]);
    let inode = if payload.len() >= 40 {
        Some(codec::read_u32_both(&payload[32..40]))
    } else {
        None
    };

    Ok(PosixAttributes { mode, links, uid, gid, inode })
}

fn parse_sl(payload: &[u8]) -> Result<SuspEntry> {
    if payload.is_empty() {
        return Err(Error::Malformed("SL entry missing flags byte".into()));
    }
    let continues = payload[0] & 0x01 != 0;
    let mut components = Vec::new();
    let mut offset = 1;

    while offset + 2 <= payload.len() {
        let flags = SymlinkComponentFlags::from_bits_truncate(payload[offset]);
        let len = payload[offset + 1] as usize;
        offset += 2;
        if offset + len > payload.len() {
            break;
        }
        let content = String::from_utf8_lossy(&payload[offset..offset + len]).into_owned();
        offset += len;
        components.push(SymlinkComponent { flags, content });
    }

    Ok(SuspEntry::SymbolicLink { continues, components })
}

fn parse_tf(payload: &[u8]) -> Timestamps {
    if payload.is_empty() {
        return Timestamps::default();
    }
    let flags = TimestampFlags::from_bits_truncate(payload[0]);
    let long_form = flags.contains(TimestampFlags::LONG_FORM);
    let field_size = if long_form { 17 } else { 7 };

    let mut offset = 1;
    let mut next = || {
        if offset + field_size > payload.len() {
            return None;
        }
        let field = &payload[offset..offset + field_size];
        offset += field_size;
        Some(if long_form {
            codec::read_volume_datetime(field)
        } else {
            codec::read_record_datetime(field)
        })
    };

    let mut timestamps = Timestamps::default();
    if flags.contains(TimestampFlags::CREATION) {
        timestamps.creation = next();
    }
    if flags.contains(TimestampFlags::MODIFY) {
        timestamps.modify = next();
    }
    if flags.contains(TimestampFlags::ACCESS) {
        timestamps.access = next();
    }
    if flags.contains(TimestampFlags::ATTRIBUTES) {
        timestamps.attributes = next();
    }
    if flags.contains(TimestampFlags::BACKUP) {
        timestamps.backup = next();
    }
    if flags.contains(TimestampFlags::EXPIRATION) {
        timestamps.expiration = next();
    }
    if flags.contains(TimestampFlags::EFFECTIVE) {
        timestamps.effective = next();
    }
    timestamps
}

/// Known Rock Ridge extension identifier strings (ER payloads).
pub const ROCK_RIDGE_IDENTIFIERS: [&str; 3] = ["RRIP_1991A", "IEEE_P1282", "IEEE_1282"];

/// The outcome of scanning a root directory's system-use area for SUSP and
/// Rock Ridge presence (C5's `detected`/`skipBytes`/`extensions` state).
#[derive(Debug, Clone, Default)]
pub struct ExtensionState {
    pub detected: bool,
    pub skip_bytes: u8,
    pub rock_ridge_identifier: Option<String>,
    pub other_extensions: Vec<String>,
}

impl ExtensionState {
    pub fn is_rock_ridge(&self) -> bool {
        self.rock_ridge_identifier.is_some()
    }
}

/// Classifies a fully-parsed chain of SUSP entries from the root directory's
/// self record into the [`ExtensionState`] the rest of the reader consults.
pub fn classify(entries: &[SuspEntry]) -> ExtensionState {
    let mut state = ExtensionState::default();
    let mut saw_legacy_rr = false;

    for entry in entries {
        match entry {
            SuspEntry::SharingProtocolIndicator { skip_bytes } => {
                state.detected = true;
                state.skip_bytes = *skip_bytes;
            }
            SuspEntry::ExtensionReference { identifier } => {
                if ROCK_RIDGE_IDENTIFIERS.contains(&identifier.as_str()) {
                    state.rock_ridge_identifier.get_or_insert_with(|| identifier.clone());
                } else {
                    state.other_extensions.push(identifier.clone());
                }
            }
            SuspEntry::LegacyRockRidgeMarker => saw_legacy_rr = true,
            _ => {}
        }
    }

    if state.rock_ridge_identifier.is_none() && saw_legacy_rr {
        debug!("no ER entry named Rock Ridge but a legacy RR marker was seen; inferring RRIP_1991A");
        state.rock_ridge_identifier = Some("RRIP_1991A".to_string());
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp_entry(skip: u8) -> Vec<u8> {
        let mut buf = vec![b'S', b'P', 7, 1];
        buf.push(SP_MAGIC[0]);
        buf.push(SP_MAGIC[1]);
        buf.push(skip);
        buf
    }

    fn er_entry(identifier: &str) -> Vec<u8> {
        let mut buf = vec![b'E', b'R', 0, 1];
        buf.push(identifier.len() as u8);
        buf.push(0);
        buf.push(0);
        buf.extend_from_slice(identifier.as_bytes());
        buf[2] = buf.len() as u8;
        buf
    }

    fn no_op_fetcher() -> impl ContinuationFetcher {
        |_: u32, _: u32, _: u32| -> Result<Vec<u8>> { Ok(Vec::new()) }
    }

    /// Encodes a u32 as the 8-byte both-endian form used throughout ECMA-119.
    fn both_endian32(value: u32) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&value.to_le_bytes());
        buf[4..8].copy_from_slice(&value.to_be_bytes());
        buf
    }

    #[test]
    fn detects_sp_and_skip_bytes() {
        let chain = sp_entry(5);
        let mut fetcher = no_op_fetcher();
        let entries = parse_chain(&chain, 0, &mut fetcher).unwrap();
        let state = classify(&entries);
        assert!(state.detected);
        assert_eq!(state.skip_bytes, 5);
    }

    #[test]
    fn er_entry_identifies_rock_ridge() {
        let mut chain = sp_entry(0);
        chain.extend(er_entry("RRIP_1991A"));
        let mut fetcher = no_op_fetcher();
        let entries = parse_chain(&chain, 0, &mut fetcher).unwrap();
        let state = classify(&entries);
        assert_eq!(state.rock_ridge_identifier.as_deref(), Some("RRIP_1991A"));
    }

    #[test]
    fn legacy_rr_without_er_infers_rrip_1991a() {
        let mut chain = sp_entry(0);
        chain.extend_from_slice(&[b'R', b'R', 5, 1, 0]);
        let mut fetcher = no_op_fetcher();
        let entries = parse_chain(&chain, 0, &mut fetcher).unwrap();
        let state = classify(&entries);
        assert_eq!(state.rock_ridge_identifier.as_deref(), Some("RRIP_1991A"));
    }

    #[test]
    fn ce_entry_follows_continuation_and_concatenates() {
        let mut chain = sp_entry(0);
        let mut ce = vec![b'C', b'E', 28, 1];
        ce.extend_from_slice(&both_endian32(7));
        ce.extend_from_slice(&both_endian32(0));
        ce.extend_from_slice(&both_endian32(er_entry("RRIP_1991A").len() as u32));
        chain.extend(ce);

        let continuation = er_entry("RRIP_1991A");
        let mut fetcher = move |extent: u32, offset: u32, _len: u32| -> Result<Vec<u8>> {
            assert_eq!(extent, 7);
            assert_eq!(offset, 0);
            Ok(continuation.clone())
        };

        let entries = parse_chain(&chain, 0, &mut fetcher).unwrap();
        let state = classify(&entries);
        assert_eq!(state.rock_ridge_identifier.as_deref(), Some("RRIP_1991A"));
    }

    #[test]
    fn ce_loop_is_rejected() {
        let mut ce = vec![b'C', b'E', 28, 1];
        ce.extend_from_slice(&both_endian32(7));
        ce.extend_from_slice(&both_endian32(0));
        ce.extend_from_slice(&both_endian32(28));
        let chain = ce.clone();

        let mut fetcher = move |_: u32, _: u32, _: u32| -> Result<Vec<u8>> { Ok(ce.clone()) };
        let err = parse_chain(&chain, 0, &mut fetcher).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn nm_fragments_are_returned_for_caller_concatenation() {
        let mut buf = vec![b'N', b'M', 0, 1, 0];
        buf.extend_from_slice(b"Makefile.am");
        buf[2] = buf.len() as u8;
        let mut fetcher = no_op_fetcher();
        let entries = parse_chain(&buf, 0, &mut fetcher).unwrap();
        match &entries[0] {
            SuspEntry::AlternateName { fragment, .. } => assert_eq!(fragment, "Makefile.am"),
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn px_mode_identifies_symlink() {
        let mut buf = vec![b'P', b'X', 0, 1];
        buf.extend_from_slice(&both_endian32(PosixFileMode::TYPE_SYMLINK.bits() | 0o755));
        buf.extend_from_slice(&both_endian32(1));
        buf.extend_from_slice(&both_endian32(0));
        buf.extend_from_slice(&both_endian32(0));
        buf[2] = buf.len() as u8;
        let mut fetcher = no_op_fetcher();
        let entries = parse_chain(&buf, 0, &mut fetcher).unwrap();
        match &entries[0] {
            SuspEntry::PosixAttributes(px) => assert!(px.mode.is_symlink()),
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn st_entry_stops_iteration() {
        let mut buf = sp_entry(0);
        buf.extend_from_slice(&[b'S', b'T', 4, 1]);
        buf.extend(er_entry("RRIP_1991A")); // should never be reached
        let mut fetcher = no_op_fetcher();
        let entries = parse_chain(&buf, 0, &mut fetcher).unwrap();
        assert!(matches!(entries.last(), Some(SuspEntry::Stop)));
        assert!(entries
            .iter()
            .all(|e| !matches!(e, SuspEntry::ExtensionReference { .. })));
    }
}
