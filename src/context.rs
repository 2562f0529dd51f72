//! C5: shared reader state — the backing stream, the active character
//! encoding, and whatever Rock Ridge extension was negotiated for this
//! volume.
//!
//! The stream is wrapped in a [`RefCell`] rather than threaded through every
//! call as `&mut self`: directory traversal needs to borrow a record from one
//! part of the tree while reading another extent to resolve it (e.g.
//! following a `CE` continuation area while still holding the directory
//! entries that referenced it), and `RefCell` lets those borrows nest
//! without restructuring every call site into one giant `&mut` chain. This
//! is also why [`Context`] is deliberately not `Sync` — a single image is
//! read from a single thread at a time.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom};

use crate::codec::Encoding;
use crate::error::Result;
use crate::susp::ExtensionState;

/// Everything a directory or file lookup needs to pull bytes off the disc
/// and interpret them.
#[derive(Debug)]
pub struct Context<R> {
    stream: RefCell<R>,
    logical_block_size: u32,
    encoding: Encoding,
    rock_ridge: Option<ExtensionState>,
}

impl<R: Read + Seek> Context<R> {
    pub fn new(
        stream: R,
        logical_block_size: u32,
        encoding: Encoding,
        rock_ridge: Option<ExtensionState>,
    ) -> Self {
        Self {
            stream: RefCell::new(stream),
            logical_block_size,
            encoding,
            rock_ridge,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn logical_block_size(&self) -> u32 {
        self.logical_block_size
    }

    pub fn rock_ridge(&self) -> Option<&ExtensionState> {
        self.rock_ridge.as_ref()
    }

    /// Unwraps the backing stream, discarding the encoding/extension state.
    /// Used when a reader needs to re-open the same stream under a
    /// different [`Context`] configuration once SUSP detection runs.
    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }

    /// Reads exactly one logical block at `lba`.
    pub fn read_sector(&self, lba: u32) -> Result<Vec<u8>> {
        self.read_at(lba as u64 * self.logical_block_size as u64, self.logical_block_size as usize)
    }

    /// Reads `len` bytes starting at an absolute byte offset into the image.
    pub fn read_at(&self, byte_offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut stream = self.stream.borrow_mut();
        stream.seek(SeekFrom::Start(byte_offset))?;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads every extent of a (possibly multi-extent) file into one buffer.
    ///
    /// Multi-extent files are represented on disc as consecutive directory
    /// records sharing an identifier, each but the last flagged
    /// [`crate::record::RecordFlags::NOT_FINAL`]; see [`crate::stream`] for
    /// the `Read + Seek` view built from these ranges.
    pub fn read_extent(&self, extent_lba: u32, data_length: u32) -> Result<Vec<u8>> {
        self.read_at(extent_lba as u64 * self.logical_block_size as u64, data_length as usize)
    }

    /// A closure suitable for [`crate::susp::parse_chain`]'s continuation
    /// fetcher, bound to this context's stream and block size.
    pub fn continuation_fetcher(&self) -> impl FnMut(u32, u32, u32) -> Result<Vec<u8>> + '_ {
        move |extent_lba: u32, offset: u32, length: u32| {
            let absolute = extent_lba as u64 * self.logical_block_size as u64 + offset as u64;
            self.read_at(absolute, length as usize)
        }
    }
}
