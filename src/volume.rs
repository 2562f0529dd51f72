//! C2: volume descriptor model (ECMA-119 §8).

use crate::codec::{self, Encoding};
use crate::constants::{self, volume_type};
use crate::error::{Error, Result};
use crate::record::DirectoryRecord;

/// The type tag carried by every volume descriptor's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDescriptorKind {
    Boot,
    Primary,
    Supplementary,
    Partition,
    SetTerminator,
    /// A reserved/unknown type code; the scanner still records it so the
    /// set-terminator search doesn't stop early on an unfamiliar extension.
    Unknown(u8),
}

impl VolumeDescriptorKind {
    fn from_tag(tag: u8) -> Self {
        match tag {
            volume_type::BOOT_RECORD => Self::Boot,
            volume_type::PRIMARY => Self::Primary,
            volume_type::SUPPLEMENTARY => Self::Supplementary,
            volume_type::PARTITION => Self::Partition,
            volume_type::SET_TERMINATOR => Self::SetTerminator,
            other => Self::Unknown(other),
        }
    }
}

/// The 7-byte header shared by every volume descriptor.
#[derive(Debug, Clone, Copy)]
pub struct BaseVolumeDescriptor {
    pub kind: VolumeDescriptorKind,
    pub version: u8,
}

impl BaseVolumeDescriptor {
    /// Parses just the 7-byte header, validating the `CD001` standard
    /// identifier. Does not require a specific version, since Joliet
    /// supplementary descriptors are occasionally stamped with version 2
    /// by authoring tools in violation of the base spec.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 7 {
            return Err(Error::Malformed("volume descriptor shorter than 7 bytes".into()));
        }
        if &buf[1..6] != constants::STANDARD_IDENTIFIER {
            return Err(Error::NotIso9660);
        }

        Ok(Self {
            kind: VolumeDescriptorKind::from_tag(buf[0]),
            version: buf[6],
        })
    }
}

/// Fields shared by the Primary and Supplementary volume descriptors
/// (ECMA-119 §8.4 / §8.5), decoded in the descriptor's active character
/// encoding.
#[derive(Debug, Clone)]
pub struct CommonVolumeDescriptor {
    pub kind: VolumeDescriptorKind,
    pub encoding: Encoding,
    pub volume_identifier: String,
    pub volume_space_size: u32,
    pub volume_set_size: u16,
    pub volume_sequence_number: u16,
    pub logical_block_size: u16,
    pub path_table_size: u32,
    pub type_l_path_table_lba: u32,
    pub type_m_path_table_lba: u32,
    pub root_directory_record: DirectoryRecord,
}

impl CommonVolumeDescriptor {
    /// Parses the common Primary/Supplementary layout out of a full
    /// 2048-byte descriptor sector.
    ///
    /// `encoding` is supplied by the caller: Primary descriptors are always
    /// ASCII; Supplementary descriptors infer it from the escape sequence
    /// field at `+88` (see [`infer_supplementary_encoding`]).
    pub fn parse(buf: &[u8], kind: VolumeDescriptorKind, encoding: Encoding) -> Result<Self> {
        if buf.len() < constants::SECTOR_SIZE {
            return Err(Error::Malformed(
                "volume descriptor sector shorter than 2048 bytes".into(),
            ));
        }

        let volume_identifier = codec::read_string(&buf[40..72], encoding);
        let volume_space_size = codec::read_u32_both(&buf[80..88]);
        let volume_set_size = codec::read_u16_both(&buf[120..124]);
        let volume_sequence_number = codec::read_u16_both(&buf[124..128]);
        let logical_block_size = codec::read_u16_both(&buf[128..132]);
        let path_table_size = codec::read_u32_both(&buf[132..140]);
        let type_l_path_table_lba = u32::from_le_bytes(buf[140..144].try_into().unwrap());
        let type_m_path_table_be = u32::from_le_bytes(buf[148..152].try_into().unwrap());
        let type_m_path_table_lba = codec::bit_swap_u32(type_m_path_table_be);

        let (root_record, consumed) = DirectoryRecord::read(&buf[156..190], 0, Encoding::Ascii)?;
        if consumed == 0 {
            return Err(Error::Malformed(
                "embedded root directory record is empty".into(),
            ));
        }

        Ok(Self {
            kind,
            encoding,
            volume_identifier,
            volume_space_size,
            volume_set_size,
            volume_sequence_number,
            logical_block_size,
            path_table_size,
            type_l_path_table_lba,
            type_m_path_table_lba,
            root_directory_record: root_record,
        })
    }
}

/// Inspects the escape-sequences field (`+88..+120`) of a Supplementary
/// Volume Descriptor and returns UCS-2BE if it names one of the three
/// Joliet levels, ASCII otherwise.
pub fn infer_supplementary_encoding(buf: &[u8]) -> Encoding {
    if buf.len() < 91 {
        return Encoding::Ascii;
    }
    let candidate = &buf[88..91];
    if constants::JOLIET_ESCAPE_SEQUENCES
        .iter()
        .any(|seq| seq == candidate)
    {
        Encoding::Ucs2Be
    } else {
        Encoding::Ascii
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(tag: u8) -> Vec<u8> {
        let mut buf = vec![0u8; constants::SECTOR_SIZE];
        buf[0] = tag;
        buf[1..6].copy_from_slice(constants::STANDARD_IDENTIFIER);
        buf[6] = 1;
        buf
    }

    #[test]
    fn base_descriptor_rejects_wrong_standard_id() {
        let mut buf = make_header(volume_type::PRIMARY);
        buf[1..6].copy_from_slice(b"CDXXX");
        assert!(matches!(
            BaseVolumeDescriptor::parse(&buf),
            Err(Error::NotIso9660)
        ));
    }

    #[test]
    fn base_descriptor_recognises_kinds() {
        let buf = make_header(volume_type::SET_TERMINATOR);
        let base = BaseVolumeDescriptor::parse(&buf).unwrap();
        assert_eq!(base.kind, VolumeDescriptorKind::SetTerminator);
    }

    #[test]
    fn joliet_escape_sequences_select_ucs2be() {
        let mut buf = make_header(volume_type::SUPPLEMENTARY);
        buf[88..91].copy_from_slice(&[0x25, 0x2F, 0x45]);
        assert_eq!(infer_supplementary_encoding(&buf), Encoding::Ucs2Be);
    }

    #[test]
    fn non_joliet_escape_sequence_is_ascii() {
        let buf = make_header(volume_type::SUPPLEMENTARY);
        assert_eq!(infer_supplementary_encoding(&buf), Encoding::Ascii);
    }
}
