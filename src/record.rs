//! C3: directory record binary decoding (ECMA-119 §9.1).

use bitflags::bitflags;

use crate::codec::{self, Encoding};

bitflags! {
    /// Flags byte at offset `+25` of a directory record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u8 {
        const HIDDEN          = 1 << 0;
        const DIRECTORY       = 1 << 1;
        const ASSOCIATED_FILE = 1 << 2;
        const RECORD          = 1 << 3;
        const PROTECTION      = 1 << 4;
        const RESERVED_5      = 1 << 5;
        const RESERVED_6      = 1 << 6;
        /// Not the final extent of a multi-extent file.
        const NOT_FINAL       = 1 << 7;
    }
}

/// A single decoded directory record.
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    /// Length of the record in bytes, as it appeared on disc.
    pub length: u8,
    pub extended_attribute_length: u8,
    pub extent_lba: u32,
    pub data_length: u32,
    pub recording_time: chrono::DateTime<chrono::FixedOffset>,
    pub flags: RecordFlags,
    pub file_unit_size: u8,
    pub interleave_gap_size: u8,
    pub volume_sequence_number: u16,
    /// Raw file identifier bytes decoded to a string in the active encoding.
    /// For the special self/parent entries this is the one-character string
    /// `"\0"` or `"\x01"` — callers must filter these out before surfacing
    /// records to users (see [`crate::directory`]).
    pub file_identifier: String,
    /// The system-use area trailing the identifier, untouched by this
    /// decoder. SUSP/Rock Ridge parsing happens in [`crate::susp`].
    pub system_use: Vec<u8>,
}

impl DirectoryRecord {
    /// Parses one directory record starting at `offset` within `buf`.
    ///
    /// Returns the decoded record and the number of bytes consumed
    /// (`buf[offset]`). A consumed length of `0` means there are no more
    /// records in the current logical block; the caller should advance to
    /// the next sector boundary.
    pub fn read(buf: &[u8], offset: usize, encoding: Encoding) -> crate::error::Result<(Self, usize)> {
        if offset >= buf.len() {
            return Ok((Self::empty(), 0));
        }

        let length = buf[offset];
        if length == 0 {
            return Ok((Self::empty(), 0));
        }

        let length = length as usize;
        if offset + length > buf.len() {
            return Err(crate::error::Error::Malformed(format!(
                "directory record at offset {offset} claims length {length} but only {} bytes remain",
                buf.len() - offset
            )));
        }

        let record = &buf[offset..offset + length];
        if record.len() < 33 {
            return Err(crate::error::Error::Malformed(format!(
                "directory record at offset {offset} is shorter than the fixed 33-byte header"
            )));
        }

        let extended_attribute_length = record[1];
        let extent_lba = codec::read_u32_both(&record[2..10]);
        let data_length = codec::read_u32_both(&record[10..18]);
        let recording_time = codec::read_record_datetime(&record[18..25]);
        let flags = RecordFlags::from_bits_truncate(record[25]);
        let file_unit_size = record[26];
        let interleave_gap_size = record[27];
        let volume_sequence_number = codec::read_u16_both(&record[28..32]);
        let identifier_length = record[32] as usize;

        if 33 + identifier_length > record.len() {
            return Err(crate::error::Error::Malformed(format!(
                "directory record at offset {offset} has identifier length {identifier_length} exceeding record bounds"
            )));
        }

        let file_identifier =
            codec::read_string(&record[33..33 + identifier_length], encoding);

        let mut start_sys = 33 + identifier_length;
        if identifier_length % 2 == 0 {
            start_sys += 1;
        }
        let system_use = if start_sys < record.len() {
            record[start_sys..].to_vec()
        } else {
            Vec::new()
        };

        Ok((
            Self {
                length: length as u8,
                extended_attribute_length,
                extent_lba,
                data_length,
                recording_time,
                flags,
                file_unit_size,
                interleave_gap_size,
                volume_sequence_number,
                file_identifier,
                system_use,
            },
            length,
        ))
    }

    fn empty() -> Self {
        Self {
            length: 0,
            extended_attribute_length: 0,
            extent_lba: 0,
            data_length: 0,
            recording_time: codec::epoch_sentinel(),
            flags: RecordFlags::empty(),
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_sequence_number: 0,
            file_identifier: String::new(),
            system_use: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(RecordFlags::DIRECTORY)
    }

    pub fn is_not_final_extent(&self) -> bool {
        self.flags.contains(RecordFlags::NOT_FINAL)
    }

    /// Whether the identifier is the special self (`.`) entry.
    pub fn is_self(&self) -> bool {
        self.file_identifier == "\u{0}"
    }

    /// Whether the identifier is the special parent (`..`) entry.
    pub fn is_parent(&self) -> bool {
        self.file_identifier == "\u{1}"
    }

    /// Strips an ISO-9660 version suffix (`;N`) from a file identifier.
    ///
    /// Idempotent: applying it twice yields the same result as applying it
    /// once, and it only ever strips the single trailing `;N` segment.
    pub fn format_file_name(name: &str) -> String {
        match name.find(';') {
            Some(0) | None => name.to_string(),
            Some(pos) => name[..pos].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(identifier: &[u8], flags: u8) -> Vec<u8> {
        let id_len = identifier.len();
        let mut len = 33 + id_len;
        if id_len % 2 == 0 {
            len += 1;
        }
        let mut buf = vec![0u8; len];
        buf[0] = len as u8;
        buf[2..6].copy_from_slice(&100u32.to_le_bytes());
        buf[6..10].copy_from_slice(&0u32.to_be_bytes());
        buf[10..14].copy_from_slice(&2048u32.to_le_bytes());
        buf[14..18].copy_from_slice(&0u32.to_be_bytes());
        buf[25] = flags;
        buf[32] = id_len as u8;
        buf[33..33 + id_len].copy_from_slice(identifier);
        buf
    }

    #[test]
    fn reads_basic_fields() {
        let buf = sample_record(b"FOO.TXT;1", 0);
        let (record, consumed) = DirectoryRecord::read(&buf, 0, Encoding::Ascii).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(record.extent_lba, 100);
        assert_eq!(record.data_length, 2048);
        assert_eq!(record.file_identifier, "FOO.TXT;1");
        assert!(!record.is_directory());
    }

    #[test]
    fn zero_length_signals_end_of_block() {
        let buf = [0u8; 16];
        let (_record, consumed) = DirectoryRecord::read(&buf, 0, Encoding::Ascii).unwrap();
        assert_eq!(consumed, 0);
    }

    #[test]
    fn self_and_parent_identifiers_round_trip() {
        let buf = sample_record(&[0], 1 << 1);
        let (record, _) = DirectoryRecord::read(&buf, 0, Encoding::Ascii).unwrap();
        assert!(record.is_self());
        assert!(record.is_directory());

        let buf = sample_record(&[1], 1 << 1);
        let (record, _) = DirectoryRecord::read(&buf, 0, Encoding::Ascii).unwrap();
        assert!(record.is_parent());
    }

    #[test]
    fn truncated_record_is_malformed() {
        let mut buf = sample_record(b"X", 0);
        buf[0] = 255; // claims far more bytes than the buffer holds
        let err = DirectoryRecord::read(&buf, 0, Encoding::Ascii).unwrap_err();
        assert!(matches!(err, crate::error::Error::Malformed(_)));
    }

    #[test]
    fn format_file_name_strips_version_suffix_once() {
        assert_eq!(DirectoryRecord::format_file_name("FOO.TXT;1"), "FOO.TXT");
        assert_eq!(DirectoryRecord::format_file_name("FOO.TXT"), "FOO.TXT");
        let once = DirectoryRecord::format_file_name("FOO.TXT;1");
        let twice = DirectoryRecord::format_file_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn format_file_name_leaves_leading_semicolon_alone() {
        assert_eq!(DirectoryRecord::format_file_name(";weird"), ";weird");
    }
}
