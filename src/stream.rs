//! A `Read + Seek` view over a file's extents.
//!
//! Single-extent files are the overwhelming majority, but a file larger than
//! the authoring tool's extent limit (or one assembled from several source
//! files by certain mastering software) is recorded as a run of directory
//! records chained by [`crate::record::RecordFlags::NOT_FINAL`], each with
//! its own extent location. [`ClusterReader`] stitches those extents back
//! into one logical byte stream so callers never need to know a file was
//! fragmented at all.

use std::io::{Read, Seek, SeekFrom};

use crate::context::Context;
use crate::error::{Error, Result};

#[derive(Debug)]
struct Extent {
    /// Offset of this extent's first byte within the logical stream.
    logical_start: u64,
    byte_offset: u64,
    length: u64,
}

/// A read-only, seekable view over one or more extents concatenated in disc
/// order.
#[derive(Debug)]
pub struct ClusterReader<'ctx, R> {
    ctx: &'ctx Context<R>,
    extents: Vec<Extent>,
    total_length: u64,
    position: u64,
}

impl<'ctx, R: Read + Seek> ClusterReader<'ctx, R> {
    pub fn new(ctx: &'ctx Context<R>, extents: &[(u32, u32)]) -> Self {
        let block_size = ctx.logical_block_size() as u64;
        let mut logical_start = 0u64;
        let resolved = extents
            .iter()
            .map(|&(lba, len)| {
                let extent = Extent {
                    logical_start,
                    byte_offset: lba as u64 * block_size,
                    length: len as u64,
                };
                logical_start += extent.length;
                extent
            })
            .collect();

        Self {
            ctx,
            extents: resolved,
            total_length: logical_start,
            position: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.total_length
    }

    pub fn is_empty(&self) -> bool {
        self.total_length == 0
    }

    fn locate(&self, logical_position: u64) -> Option<(&Extent, u64)> {
        self.extents
            .iter()
            .find(|extent| {
                logical_position >= extent.logical_start
                    && logical_position < extent.logical_start + extent.length
            })
            .map(|extent| (extent, logical_position - extent.logical_start))
    }
}

impl<'ctx, R: Read + Seek> Read for ClusterReader<'ctx, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.total_length || buf.is_empty() {
            return Ok(0);
        }

        let Some((extent, within)) = self.locate(self.position) else {
            return Ok(0);
        };

        let available = extent.length - within;
        let to_read = (buf.len() as u64).min(available) as usize;
        let chunk = self
            .ctx
            .read_at(extent.byte_offset + within, to_read)
            .map_err(io_error)?;
        buf[..to_read].copy_from_slice(&chunk);
        self.position += to_read as u64;
        Ok(to_read)
    }
}

impl<'ctx, R: Read + Seek> Seek for ClusterReader<'ctx, R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_position = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.total_length as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if new_position < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }

        self.position = new_position as u64;
        Ok(self.position)
    }
}

fn io_error(err: Error) -> std::io::Error {
    match err {
        Error::Io(io_err) => io_err,
        other => std::io::Error::new(std::io::ErrorKind::Other, other),
    }
}
