//! C8: the ISO reader driver — descriptor-set scanning, variant selection,
//! and `PathToClusters`/`Detect`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

use log::{debug, info, warn};

use crate::codec::Encoding;
use crate::constants::{self, volume_type, SECTOR_SIZE, VOLUME_DESCRIPTOR_SET_START};
use crate::context::Context;
use crate::directory::{self, DirEntry};
use crate::error::{Error, Result};
use crate::record::DirectoryRecord;
use crate::susp;
use crate::vfs::VfsBackend;
use crate::volume::{self, BaseVolumeDescriptor, CommonVolumeDescriptor, VolumeDescriptorKind};

/// Which on-disc variant a reader ultimately selected, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Joliet,
    RockRidge,
    Iso9660,
}

/// A directory's location: its extent and byte length, sufficient to read
/// it again without holding a borrow on anything.
pub type DirHandle = (u32, u32);

/// An open ISO 9660 image: the selected variant, its root directory, and
/// the shared [`Context`] every read goes through.
#[derive(Debug)]
pub struct Reader<R> {
    ctx: Context<R>,
    root: DirHandle,
    variant: Variant,
    directory_cache: RefCell<HashMap<u32, Rc<Vec<DirEntry>>>>,
}

impl<R: Read + Seek> Reader<R> {
    /// Scans the volume descriptor set and opens the best available
    /// variant, preferring Joliet, then Rock Ridge, then plain ISO 9660.
    pub fn open(mut stream: R) -> Result<Self> {
        let (primary, supplementary) = scan_descriptors(&mut stream)?;

        if let Some((common, sector)) = &supplementary {
            if common.encoding == Encoding::Ucs2Be {
                info!("opened ISO image as Joliet at sector {sector}");
                let ctx = Context::new(stream, common.logical_block_size as u32, Encoding::Ucs2Be, None);
                let root = root_handle(&common.root_directory_record);
                return Ok(Self {
                    ctx,
                    root,
                    variant: Variant::Joliet,
                    directory_cache: RefCell::new(HashMap::new()),
                });
            }
            debug!("supplementary descriptor at sector {sector} is not Joliet, falling through");
        }

        let Some((primary, _sector)) = primary else {
            return Err(Error::NoSupportedVariant);
        };

        let block_size = primary.logical_block_size as u32;
        let fetcher_ctx = Context::new(stream, block_size, Encoding::Ascii, None);

        // The root directory record embedded in the PVD is a fixed 34 bytes
        // with no room for a System Use area; Rock Ridge's SP/ER pair lives
        // on the "." self-entry of the root directory's own extent instead.
        let root_block = fetcher_ctx.read_sector(primary.root_directory_record.extent_lba)?;
        let (root_self_entry, _) = DirectoryRecord::read(&root_block, 0, Encoding::Ascii)?;
        let state = susp::classify(&susp::parse_chain(
            &root_self_entry.system_use,
            0,
            &mut fetcher_ctx.continuation_fetcher(),
        )?);

        if state.detected && state.is_rock_ridge() {
            info!("opened ISO image as Rock Ridge ({})", state.rock_ridge_identifier.as_deref().unwrap_or("?"));
            let root = root_handle(&primary.root_directory_record);
            let ctx = Context::new(fetcher_ctx.into_inner(), block_size, Encoding::Ascii, Some(state));
            return Ok(Self {
                ctx,
                root,
                variant: Variant::RockRidge,
                directory_cache: RefCell::new(HashMap::new()),
            });
        }

        info!("opened ISO image as plain ISO 9660");
        let root = root_handle(&primary.root_directory_record);
        Ok(Self {
            ctx: Context::new(fetcher_ctx.into_inner(), block_size, Encoding::Ascii, None),
            root,
            variant: Variant::Iso9660,
            directory_cache: RefCell::new(HashMap::new()),
        })
    }

    /// Cheaply checks whether `stream` looks like an ISO 9660 image, without
    /// doing any of the work `open` does.
    pub fn detect(stream: &mut R) -> Result<bool> {
        let length = stream.seek(SeekFrom::End(0))?;
        if length < VOLUME_DESCRIPTOR_SET_START + SECTOR_SIZE as u64 {
            return Ok(false);
        }
        stream.seek(SeekFrom::Start(VOLUME_DESCRIPTOR_SET_START))?;
        let mut buf = [0u8; 7];
        stream.read_exact(&mut buf)?;
        Ok(&buf[1..6] == constants::STANDARD_IDENTIFIER)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn root(&self) -> DirHandle {
        self.root
    }

    pub(crate) fn context(&self) -> &Context<R> {
        &self.ctx
    }

    /// `PathToClusters`: resolves `path` and returns every extent backing
    /// it, in disc order. A file's ranges are `(lba, byte_length)` pairs
    /// covering its actual extents. A directory instead yields a single
    /// `(lba, sector_count)` range — its data length rounded up to whole
    /// sectors — and requires contiguous layout (`file_unit_size == 0 &&
    /// interleave_gap_size == 0`); anything else is `Unsupported`.
    pub fn path_to_clusters(&self, path: &str) -> Result<Vec<(u32, u64)>> {
        let entry = crate::vfs::resolve(self, path)?
            .ok_or_else(|| Error::FileNotFound(path.to_string().into()))?;

        if entry.is_directory {
            if entry.file_unit_size != 0 || entry.interleave_gap_size != 0 {
                return Err(Error::Unsupported(format!(
                    "directory {path} uses interleaved extents, which this reader does not support"
                )));
            }
            let sector_count = entry.data_length.div_ceil(SECTOR_SIZE as u64);
            return Ok(vec![(entry.extent_lba, sector_count)]);
        }

        Ok(entry.extents.iter().map(|&(lba, len)| (lba, len as u64)).collect())
    }

    fn list_directory(&self, dir: DirHandle) -> Result<Rc<Vec<DirEntry>>> {
        if let Some(cached) = self.directory_cache.borrow().get(&dir.0) {
            return Ok(Rc::clone(cached));
        }
        let entries = Rc::new(directory::read_directory(&self.ctx, dir.0, dir.1)?);
        self.directory_cache.borrow_mut().insert(dir.0, Rc::clone(&entries));
        Ok(entries)
    }
}

fn root_handle(record: &DirectoryRecord) -> DirHandle {
    (record.extent_lba, record.data_length)
}

/// Scans sectors starting at LBA 16, decoding a base header at each and a
/// full [`CommonVolumeDescriptor`] for the first Primary and first
/// Supplementary encountered. Stops at a set terminator or a short read.
fn scan_descriptors<R: Read + Seek>(
    stream: &mut R,
) -> Result<(Option<(CommonVolumeDescriptor, u32)>, Option<(CommonVolumeDescriptor, u32)>)> {
    stream.seek(SeekFrom::Start(VOLUME_DESCRIPTOR_SET_START))?;

    let mut primary = None;
    let mut supplementary = None;
    let mut sector = 16u32;

    loop {
        let mut buf = vec![0u8; SECTOR_SIZE];
        match stream.read_exact(&mut buf) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!("volume descriptor set truncated at sector {sector}");
                break;
            }
            Err(err) => return Err(err.into()),
        }

        let base = BaseVolumeDescriptor::parse(&buf)?;
        match base.kind {
            VolumeDescriptorKind::SetTerminator => break,
            VolumeDescriptorKind::Primary if primary.is_none() => {
                let common = CommonVolumeDescriptor::parse(&buf, base.kind, Encoding::Ascii)?;
                primary = Some((common, sector));
            }
            VolumeDescriptorKind::Supplementary if supplementary.is_none() => {
                let encoding = volume::infer_supplementary_encoding(&buf);
                let common = CommonVolumeDescriptor::parse(&buf, base.kind, encoding)?;
                supplementary = Some((common, sector));
            }
            _ => {}
        }

        sector += 1;
    }

    Ok((primary, supplementary))
}

impl<R: Read + Seek> VfsBackend for Reader<R> {
    type DirHandle = DirHandle;
    type Entry = DirEntry;

    fn root(&self) -> Result<Self::DirHandle> {
        Ok(self.root)
    }

    fn get_entry(&self, dir: &Self::DirHandle, name: &str) -> Result<Option<Self::Entry>> {
        let entries = self.list_directory(*dir)?;
        // Entries are listed with their `;N` version suffix already stripped
        // (see `directory::DirEntry`), but callers are free to pass it in a
        // lookup path, so normalise the query the same way before comparing.
        let normalized = DirectoryRecord::format_file_name(name);
        Ok(entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(&normalized))
            .cloned())
    }

    fn list(&self, dir: &Self::DirHandle) -> Result<Vec<Self::Entry>> {
        Ok((*self.list_directory(*dir)?).clone())
    }

    fn as_directory(&self, entry: &Self::Entry) -> Result<Self::DirHandle> {
        Ok((entry.extent_lba, entry.data_length as u32))
    }

    fn entry_name(&self, entry: &Self::Entry) -> String {
        entry.name.clone()
    }

    fn is_directory(&self, entry: &Self::Entry) -> bool {
        entry.is_directory
    }

    fn is_symlink(&self, entry: &Self::Entry) -> bool {
        entry.is_symlink()
    }

    fn symlink_target(&self, entry: &Self::Entry) -> Option<String> {
        entry.symlink_target.clone()
    }
}
