//! C6: directory listing — turns a directory extent into a flat list of
//! entries, merging multi-extent files and applying Rock Ridge overrides.

use std::io::{Read, Seek};

use chrono::{DateTime, FixedOffset};

use crate::codec::Encoding;
use crate::constants::SECTOR_SIZE;
use crate::context::Context;
use crate::error::Result;
use crate::record::DirectoryRecord;
use crate::susp::{self, PosixFileMode, SuspEntry, SymlinkComponentFlags};

/// One resolved entry in a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub extent_lba: u32,
    pub data_length: u64,
    /// Every extent backing this entry, in disc order, as `(lba, length)`.
    /// A single-extent file or directory has exactly one element here equal
    /// to `(extent_lba, data_length)`; see [`crate::stream::ClusterReader`]
    /// for how a multi-extent run is read as one logical stream.
    pub extents: Vec<(u32, u32)>,
    pub recording_time: DateTime<FixedOffset>,
    pub posix_mode: Option<PosixFileMode>,
    pub symlink_target: Option<String>,
    /// Set when an `RE` entry marked this directory as relocated; its real
    /// children live at the extent a sibling's `CL` entry points to.
    pub relocated: bool,
    /// Interleaved (non-contiguous) file unit size, straight off the
    /// directory record; non-zero alongside `interleave_gap_size` means
    /// `path_to_clusters` cannot report this entry as a flat extent range.
    pub file_unit_size: u8,
    pub interleave_gap_size: u8,
}

impl DirEntry {
    pub fn is_symlink(&self) -> bool {
        self.symlink_target.is_some() || self.posix_mode.is_some_and(|mode| mode.is_symlink())
    }
}

/// Reads and resolves every entry in the directory at `extent_lba`,
/// skipping the `.`/`..` self and parent records.
pub fn read_directory<R: Read + Seek>(
    ctx: &Context<R>,
    extent_lba: u32,
    data_length: u32,
) -> Result<Vec<DirEntry>> {
    let raw = read_raw_records(ctx, extent_lba, data_length)?;
    let grouped = merge_multi_extent(raw);

    grouped
        .into_iter()
        .map(|(record, extents)| resolve_entry(ctx, record, extents))
        .collect()
}

/// Reads every directory record in the extent, including `.`/`..` and every
/// extent of a multi-extent run, in on-disc order.
fn read_raw_records<R: Read + Seek>(
    ctx: &Context<R>,
    extent_lba: u32,
    data_length: u32,
) -> Result<Vec<DirectoryRecord>> {
    let buf = ctx.read_extent(extent_lba, data_length)?;
    let mut records = Vec::new();
    let mut offset = 0usize;
    let block_size = SECTOR_SIZE.min(ctx.logical_block_size() as usize).max(1);

    while offset < buf.len() {
        let (record, consumed) = DirectoryRecord::read(&buf, offset, ctx.encoding())?;
        if consumed == 0 {
            // End of entries in this logical block; resume at the next one.
            offset = ((offset / block_size) + 1) * block_size;
            continue;
        }
        if !record.is_self() && !record.is_parent() {
            records.push(record);
        }
        offset += consumed;
    }

    Ok(records)
}

/// Collapses consecutive records sharing an identifier and the
/// [`crate::record::RecordFlags::NOT_FINAL`] chain into a single logical
/// entry whose `data_length` is the sum of every extent.
fn merge_multi_extent(records: Vec<DirectoryRecord>) -> Vec<(DirectoryRecord, Vec<(u32, u32)>)> {
    let mut merged = Vec::new();
    let mut iter = records.into_iter().peekable();

    while let Some(first) = iter.next() {
        let mut extents = vec![(first.extent_lba, first.data_length)];
        let mut head = first;

        while head.is_not_final_extent() {
            match iter.peek() {
                Some(next) if next.file_identifier == head.file_identifier => {
                    let next = iter.next().unwrap();
                    extents.push((next.extent_lba, next.data_length));
                    head.flags = next.flags;
                }
                _ => break,
            }
        }

        merged.push((head, extents));
    }

    merged
}

fn resolve_entry<R: Read + Seek>(
    ctx: &Context<R>,
    record: DirectoryRecord,
    extents: Vec<(u32, u32)>,
) -> Result<DirEntry> {
    let total_length = extents.iter().map(|(_, len)| *len as u64).sum();
    let file_unit_size = record.file_unit_size;
    let interleave_gap_size = record.interleave_gap_size;
    let mut name = DirectoryRecord::format_file_name(&record.file_identifier);
    let mut is_directory = record.is_directory();
    let mut recording_time = record.recording_time;
    let mut posix_mode = None;
    let mut symlink_target = None;
    let mut relocated = false;

    if let Some(state) = ctx.rock_ridge() {
        let mut fetcher = ctx.continuation_fetcher();
        let entries = susp::parse_chain(&record.system_use, state.skip_bytes as usize, &mut fetcher)?;

        if let Some(rr_name) = assemble_alternate_name(&entries) {
            name = rr_name;
        }
        if let Some(target) = assemble_symlink_target(&entries) {
            symlink_target = Some(target);
        }
        for entry in &entries {
            match entry {
                SuspEntry::PosixAttributes(px) => {
                    is_directory = px.mode.is_directory();
                    posix_mode = Some(px.mode);
                }
                SuspEntry::Timestamps(tf) => {
                    if let Some(modify) = tf.modify {
                        recording_time = modify;
                    }
                }
                SuspEntry::RelocatedDirectory => relocated = true,
                _ => {}
            }
        }
    }

    Ok(DirEntry {
        name,
        is_directory,
        extent_lba: record.extent_lba,
        data_length: total_length,
        extents,
        recording_time,
        posix_mode,
        symlink_target,
        relocated,
        file_unit_size,
        interleave_gap_size,
    })
}

/// Concatenates every `NM` fragment (each may arrive across several
/// continuation areas) into the full alternate name.
fn assemble_alternate_name(entries: &[SuspEntry]) -> Option<String> {
    let mut name = String::new();
    let mut seen = false;
    for entry in entries {
        if let SuspEntry::AlternateName { fragment, .. } = entry {
            seen = true;
            name.push_str(fragment);
        }
    }
    seen.then_some(name)
}

/// Concatenates every `SL` entry's components into a POSIX-style path,
/// honouring the per-component continuation flag that joins a component to
/// the next one without an inserted separator.
fn assemble_symlink_target(entries: &[SuspEntry]) -> Option<String> {
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut saw_sl = false;
    let mut leading_root = false;

    for entry in entries {
        let SuspEntry::SymbolicLink { components, .. } = entry else {
            continue;
        };
        saw_sl = true;

        for component in components {
            if component.flags.contains(SymlinkComponentFlags::ROOT) {
                leading_root = true;
                continue;
            }
            let piece = if component.flags.contains(SymlinkComponentFlags::CURRENT) {
                "."
            } else if component.flags.contains(SymlinkComponentFlags::PARENT) {
                ".."
            } else {
                component.content.as_str()
            };
            current.push_str(piece);

            if !component.flags.contains(SymlinkComponentFlags::CONTINUE) {
                segments.push(std::mem::take(&mut current));
            }
        }
    }

    if !saw_sl {
        return None;
    }
    if !current.is_empty() {
        segments.push(current);
    }

    let joined = segments.join("/");
    Some(if leading_root { format!("/{joined}") } else { joined })
}

/// Uses an already-decoded [`DirEntry`] list to find the logical-block
/// extent a `CL` relocation points an entry's real children to.
pub fn find_child_link<R: Read + Seek>(
    ctx: &Context<R>,
    record: &DirectoryRecord,
) -> Result<Option<u32>> {
    let Some(state) = ctx.rock_ridge() else {
        return Ok(None);
    };
    let mut fetcher = ctx.continuation_fetcher();
    let entries = susp::parse_chain(&record.system_use, state.skip_bytes as usize, &mut fetcher)?;
    Ok(entries.iter().find_map(|entry| match entry {
        SuspEntry::ChildLink { extent_lba } => Some(*extent_lba),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_record(name: &[u8], flags: u8, extent_lba: u32, data_length: u32) -> Vec<u8> {
        let id_len = name.len();
        let mut len = 33 + id_len;
        if id_len % 2 == 0 {
            len += 1;
        }
        let mut buf = vec![0u8; len];
        buf[0] = len as u8;
        buf[2..6].copy_from_slice(&extent_lba.to_le_bytes());
        buf[6..10].copy_from_slice(&extent_lba.to_be_bytes());
        buf[10..14].copy_from_slice(&data_length.to_le_bytes());
        buf[14..18].copy_from_slice(&data_length.to_be_bytes());
        buf[25] = flags;
        buf[32] = id_len as u8;
        buf[33..33 + id_len].copy_from_slice(name);
        buf
    }

    fn self_and_parent_records(extent_lba: u32) -> Vec<u8> {
        let mut buf = make_record(&[0], 1 << 1, extent_lba, 2048);
        buf.extend(make_record(&[1], 1 << 1, extent_lba, 2048));
        buf
    }

    #[test]
    fn read_directory_skips_self_and_parent() {
        let mut data = self_and_parent_records(10);
        data.extend(make_record(b"FOO.TXT;1", 0, 20, 4));
        data.resize(2048, 0);

        let ctx = Context::new(Cursor::new(data), 2048, Encoding::Ascii, None);
        let entries = read_directory(&ctx, 0, 2048).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "FOO.TXT");
        assert_eq!(entries[0].extent_lba, 20);
    }

    #[test]
    fn multi_extent_records_are_summed() {
        let mut data = self_and_parent_records(10);
        data.extend(make_record(b"BIG.BIN", 1 << 7, 30, 2048));
        data.extend(make_record(b"BIG.BIN", 0, 31, 512));
        data.resize(2048, 0);

        let ctx = Context::new(Cursor::new(data), 2048, Encoding::Ascii, None);
        let entries = read_directory(&ctx, 0, 2048).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data_length, 2048 + 512);
        assert_eq!(entries[0].extent_lba, 30);
    }

    #[test]
    fn rock_ridge_nm_overrides_display_name() {
        let mut nm = vec![b'N', b'M', 0, 1, 0];
        nm.extend_from_slice(b"a-much-longer-name.txt");
        nm[2] = nm.len() as u8;

        let mut record = make_record(b"A123456.TXT;1", 0, 40, 8);
        record.extend_from_slice(&nm);
        record[0] = record.len() as u8;
        if record[0] % 2 != 0 {
            record.push(0);
            record[0] = record.len() as u8;
        }

        let mut data = self_and_parent_records(10);
        data.extend(record);
        data.resize(2048, 0);

        let state = crate::susp::ExtensionState {
            detected: true,
            skip_bytes: 0,
            rock_ridge_identifier: Some("RRIP_1991A".into()),
            other_extensions: Vec::new(),
        };
        let ctx = Context::new(Cursor::new(data), 2048, Encoding::Ascii, Some(state));
        let entries = read_directory(&ctx, 0, 2048).unwrap();
        assert_eq!(entries[0].name, "a-much-longer-name.txt");
    }

    #[test]
    fn symlink_target_concatenates_components() {
        let mut sl = vec![b'S', b'L', 0, 1, 0];
        sl.push(SymlinkComponentFlags::empty().bits());
        sl.push(3);
        sl.extend_from_slice(b"bin");
        sl[2] = sl.len() as u8;

        let mut record = make_record(b"LINK", 0, 40, 0);
        record.extend_from_slice(&sl);
        record[0] = record.len() as u8;
        if record[0] % 2 != 0 {
            record.push(0);
            record[0] = record.len() as u8;
        }

        let mut data = self_and_parent_records(10);
        data.extend(record);
        data.resize(2048, 0);

        let state = crate::susp::ExtensionState {
            detected: true,
            skip_bytes: 0,
            rock_ridge_identifier: Some("RRIP_1991A".into()),
            other_extensions: Vec::new(),
        };
        let ctx = Context::new(Cursor::new(data), 2048, Encoding::Ascii, Some(state));
        let entries = read_directory(&ctx, 0, 2048).unwrap();
        assert_eq!(entries[0].symlink_target.as_deref(), Some("bin"));
    }
}
