//! Side-effect-free decoders for the primitive types ECMA-119 stores on disc.
//!
//! Every function here takes `(buffer, ...)` and returns a decoded value; none
//! of them touch the backing stream. That keeps the only mutable state in the
//! reader confined to the stream position itself (see [`crate::context`]).

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, FixedOffset, TimeZone, Timelike};

/// Character encoding a volume descriptor's identifiers are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// a/d-characters, one byte per character.
    Ascii,
    /// Joliet: UCS-2, big-endian, two bytes per character.
    Ucs2Be,
}

/// Reads a "both-endian" u16: stored once little-endian, once big-endian.
/// Real-world images sometimes disagree between the two halves; per ECMA-119
/// readers are expected to trust the little-endian half and move on.
pub fn read_u16_both(buf: &[u8]) -> u16 {
    LittleEndian::read_u16(&buf[0..2])
}

/// Reads a "both-endian" u32 (8 bytes on disc: LE half then BE half).
pub fn read_u32_both(buf: &[u8]) -> u32 {
    LittleEndian::read_u32(&buf[0..4])
}

/// Reverses the byte order of a little-endian-read u32.
///
/// Used to pull the type-M (big-endian) path table location back out of an
/// LE read, since path tables store their location directly in one endianness
/// rather than "both-endian" doubled form.
pub fn bit_swap_u32(value: u32) -> u32 {
    value.swap_bytes()
}

/// Decodes an identifier/string field.
///
/// A one-byte field is returned verbatim as a single `char` string —  this is
/// the only way callers can distinguish the special directory-record
/// identifiers `\0` and `\x01` from an ordinary one-character name, so the
/// usual decode-and-trim path must not run for `n == 1`.
pub fn read_string(buf: &[u8], encoding: Encoding) -> String {
    if buf.len() == 1 {
        return (buf[0] as char).to_string();
    }

    match encoding {
        Encoding::Ascii => String::from_utf8_lossy(buf)
            .trim_end_matches(' ')
            .to_string(),
        Encoding::Ucs2Be => {
            let units: Vec<u16> = buf
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
                .trim_end_matches(' ')
                .to_string()
        }
    }
}

/// The sentinel returned whenever a timestamp field cannot be parsed:
/// midnight, January 1st 1970, UTC.
pub fn epoch_sentinel() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .timestamp_opt(0, 0)
        .unwrap()
}

/// Decodes the 17-byte "volume descriptor" timestamp format:
/// 16 ASCII digits `YYYYMMDDHHMMSSFF` followed by a signed GMT offset in
/// 15-minute intervals.
///
/// Some burning software writes NUL bytes instead of ASCII `'0'` into unset
/// fields; those are rewritten to `'0'` before parsing. An all-zero/all-NUL
/// field, or any field that fails range validation, yields
/// [`epoch_sentinel`] rather than an error.
pub fn read_volume_datetime(buf: &[u8]) -> DateTime<FixedOffset> {
    if buf.len() < 17 {
        return epoch_sentinel();
    }

    let mut digits = [0u8; 16];
    for (dst, &src) in digits.iter_mut().zip(buf[0..16].iter()) {
        *dst = if src == 0 { b'0' } else { src };
    }

    if digits.iter().all(|&b| b == b'0') {
        return epoch_sentinel();
    }

    let text = match std::str::from_utf8(&digits) {
        Ok(s) => s,
        Err(_) => return epoch_sentinel(),
    };

    let field = |range: std::ops::Range<usize>| text.get(range).and_then(|s| s.parse::<i32>().ok());

    let (year, month, day, hour, minute, second, hundredths) = match (
        field(0..4),
        field(4..6),
        field(6..8),
        field(8..10),
        field(10..12),
        field(12..14),
        field(14..16),
    ) {
        (Some(y), Some(mo), Some(d), Some(h), Some(mi), Some(s), Some(cs)) => {
            (y, mo, d, h, mi, s, cs)
        }
        _ => return epoch_sentinel(),
    };

    let offset_quarter_hours = buf[16] as i8;
    let offset_seconds = offset_quarter_hours as i32 * 15 * 60;
    let offset = match FixedOffset::east_opt(offset_seconds) {
        Some(offset) => offset,
        None => return epoch_sentinel(),
    };

    build_datetime(
        offset,
        year,
        clamp(month, 1, 12),
        clamp(day, 1, 31),
        clamp(hour, 0, 23),
        clamp(minute, 0, 59),
        clamp(second, 0, 59),
        clamp(hundredths, 0, 99) * 10_000_000,
    )
}

/// Decodes the 7-byte "directory record" timestamp format: a single byte of
/// years-since-1900, then month, day, hour, minute, second, and a signed
/// 15-minute-interval GMT offset.
pub fn read_record_datetime(buf: &[u8]) -> DateTime<FixedOffset> {
    if buf.len() < 7 {
        return epoch_sentinel();
    }

    let year = 1900 + buf[0] as i32;
    let offset_quarter_hours = buf[6] as i8;
    let offset_seconds = offset_quarter_hours as i32 * 15 * 60;
    let offset = match FixedOffset::east_opt(offset_seconds) {
        Some(offset) => offset,
        None => return epoch_sentinel(),
    };

    build_datetime(
        offset,
        year,
        clamp(buf[1] as i32, 1, 12),
        clamp(buf[2] as i32, 1, 31),
        clamp(buf[3] as i32, 0, 23),
        clamp(buf[4] as i32, 0, 59),
        clamp(buf[5] as i32, 0, 59),
        0,
    )
}

#[allow(clippy::too_many_arguments)]
fn build_datetime(
    offset: FixedOffset,
    year: i32,
    month: i32,
    day: i32,
    hour: i32,
    minute: i32,
    second: i32,
    nanosecond: i32,
) -> DateTime<FixedOffset> {
    offset
        .with_ymd_and_hms(
            year,
            month as u32,
            day as u32,
            hour as u32,
            minute as u32,
            second as u32,
        )
        .single()
        .and_then(|dt| dt.with_nanosecond(nanosecond as u32))
        .unwrap_or_else(epoch_sentinel)
}

fn clamp(value: i32, min: i32, max: i32) -> i32 {
    value.max(min).min(max)
}
