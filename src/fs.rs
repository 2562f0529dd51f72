//! C9: the public read-only filesystem contract.
//!
//! This is the surface most callers reach for — [`crate::reader::Reader`]
//! and the [`crate::vfs`] traversal core exist to make this thin.

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::reader::{Reader, Variant};
use crate::stream::ClusterReader;
use crate::vfs::{self, VfsBackend};

/// A read-only view over an ECMA-119 image.
///
/// Every path-taking method accepts the consumer-facing syntax described in
/// [`crate::vfs`]: backslash-separated, rooted at `""` or `"\"`, matched
/// case-insensitively.
#[derive(Debug)]
pub struct FileSystem<R> {
    reader: Reader<R>,
}

impl<R: Read + Seek> FileSystem<R> {
    /// Opens `stream` as an ISO 9660 image, selecting the best available
    /// variant (Joliet, then Rock Ridge, then plain ISO 9660).
    pub fn open(stream: R) -> Result<Self> {
        Ok(Self { reader: Reader::open(stream)? })
    }

    /// Cheaply checks whether `stream` looks like an ISO 9660 image.
    pub fn detect(stream: &mut R) -> Result<bool> {
        Reader::detect(stream)
    }

    pub fn variant(&self) -> Variant {
        self.reader.variant()
    }

    /// The path of the filesystem root, always `"\"`.
    pub fn root(&self) -> &str {
        "\\"
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        if is_root(path) {
            return Ok(true);
        }
        Ok(vfs::resolve(&self.reader, path)?.is_some())
    }

    pub fn directory_exists(&self, path: &str) -> Result<bool> {
        if is_root(path) {
            return Ok(true);
        }
        Ok(match vfs::resolve(&self.reader, path)? {
            Some(entry) => self.reader.is_directory(&entry),
            None => false,
        })
    }

    pub fn file_exists(&self, path: &str) -> Result<bool> {
        if is_root(path) {
            return Ok(false);
        }
        Ok(match vfs::resolve(&self.reader, path)? {
            Some(entry) => !self.reader.is_directory(&entry),
            None => false,
        })
    }

    pub fn get_directories(&self, path: &str, pattern: Option<&str>, recursive: bool) -> Result<Vec<String>> {
        vfs::enumerate(&self.reader, path, pattern, recursive, true, false)
    }

    pub fn get_files(&self, path: &str, pattern: Option<&str>, recursive: bool) -> Result<Vec<String>> {
        vfs::enumerate(&self.reader, path, pattern, recursive, false, true)
    }

    pub fn get_file_system_entries(&self, path: &str, pattern: Option<&str>, recursive: bool) -> Result<Vec<String>> {
        vfs::enumerate(&self.reader, path, pattern, recursive, true, true)
    }

    /// Opens a read-only, seekable stream over a file's content.
    ///
    /// There is no write/create mode: this crate only ever mounts images
    /// read-only, so any caller reaching for write access belongs on
    /// [`Error::Unsupported`] rather than a runtime flag here.
    pub fn open_file(&self, path: &str) -> Result<ClusterReader<'_, R>> {
        let entry = self.resolve_file(path)?;
        Ok(ClusterReader::new(self.context(), &entry.extents))
    }

    pub fn get_file_length(&self, path: &str) -> Result<u64> {
        Ok(self.resolve_file(path)?.data_length)
    }

    /// `PathToClusters`: every extent backing `path`, in disc order.
    pub fn path_to_clusters(&self, path: &str) -> Result<Vec<(u32, u64)>> {
        self.reader.path_to_clusters(path)
    }

    fn resolve_file(&self, path: &str) -> Result<crate::directory::DirEntry> {
        let entry = vfs::resolve(&self.reader, path)?
            .ok_or_else(|| Error::FileNotFound(path.to_string().into()))?;
        if self.reader.is_directory(&entry) {
            return Err(Error::IsADirectory(path.to_string().into()));
        }
        Ok(entry)
    }

    fn context(&self) -> &crate::context::Context<R> {
        self.reader.context()
    }
}

fn is_root(path: &str) -> bool {
    vfs::split_path(path).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{self, volume_type};
    use std::io::Cursor;

    fn image_with_file() -> Vec<u8> {
        let mut image = vec![0u8; constants::SECTOR_SIZE * 19];
        let primary_offset = constants::SECTOR_SIZE * 16;
        image[primary_offset] = volume_type::PRIMARY;
        image[primary_offset + 1..primary_offset + 6].copy_from_slice(constants::STANDARD_IDENTIFIER);
        image[primary_offset + 6] = 1;
        image[primary_offset + 128..primary_offset + 130].copy_from_slice(&2048u16.to_le_bytes());
        image[primary_offset + 130..primary_offset + 132].copy_from_slice(&2048u16.to_be_bytes());

        let root_record = &mut image[primary_offset + 156..primary_offset + 190];
        root_record[0] = 34;
        root_record[2..6].copy_from_slice(&17u32.to_le_bytes());
        root_record[6..10].copy_from_slice(&17u32.to_be_bytes());
        root_record[10..14].copy_from_slice(&2048u32.to_le_bytes());
        root_record[14..18].copy_from_slice(&2048u32.to_be_bytes());
        root_record[25] = 1 << 1;
        root_record[32] = 1;

        let terminator_offset = constants::SECTOR_SIZE * 17;
        image[terminator_offset] = volume_type::SET_TERMINATOR;
        image[terminator_offset + 1..terminator_offset + 6].copy_from_slice(constants::STANDARD_IDENTIFIER);
        image[terminator_offset + 6] = 1;

        let dir_offset = constants::SECTOR_SIZE * 17;
        let self_len = 34usize;
        image[dir_offset] = self_len as u8;
        image[dir_offset + 2..dir_offset + 6].copy_from_slice(&17u32.to_le_bytes());
        image[dir_offset + 6..dir_offset + 10].copy_from_slice(&17u32.to_be_bytes());
        image[dir_offset + 10..dir_offset + 14].copy_from_slice(&2048u32.to_le_bytes());
        image[dir_offset + 14..dir_offset + 18].copy_from_slice(&2048u32.to_be_bytes());
        image[dir_offset + 25] = 1 << 1;
        image[dir_offset + 32] = 1;

        let mut offset = dir_offset + self_len;
        let parent_len = 34usize;
        image[offset] = parent_len as u8;
        image[offset + 2..offset + 6].copy_from_slice(&17u32.to_le_bytes());
        image[offset + 6..offset + 10].copy_from_slice(&17u32.to_be_bytes());
        image[offset + 10..offset + 14].copy_from_slice(&2048u32.to_le_bytes());
        image[offset + 14..offset + 18].copy_from_slice(&2048u32.to_be_bytes());
        image[offset + 25] = 1 << 1;
        image[offset + 32] = 1;
        image[offset + 33] = 1;
        offset += parent_len;

        let name = b"README.TXT;1";
        let id_len = name.len();
        let mut rec_len = 33 + id_len;
        if id_len % 2 == 0 {
            rec_len += 1;
        }
        image[offset] = rec_len as u8;
        image[offset + 2..offset + 6].copy_from_slice(&18u32.to_le_bytes());
        image[offset + 6..offset + 10].copy_from_slice(&18u32.to_be_bytes());
        image[offset + 10..offset + 14].copy_from_slice(&5u32.to_le_bytes());
        image[offset + 14..offset + 18].copy_from_slice(&5u32.to_be_bytes());
        image[offset + 32] = id_len as u8;
        image[offset + 33..offset + 33 + id_len].copy_from_slice(name);

        let file_offset = constants::SECTOR_SIZE * 18;
        image[file_offset..file_offset + 5].copy_from_slice(b"hello");

        image
    }

    #[test]
    fn file_can_be_listed_and_read() {
        let image = image_with_file();
        let fs = FileSystem::open(Cursor::new(image)).unwrap();

        assert!(fs.directory_exists("\\").unwrap());
        assert!(fs.file_exists("\\README.TXT").unwrap());
        assert_eq!(fs.get_file_length("\\README.TXT").unwrap(), 5);

        let files = fs.get_files("\\", None, false).unwrap();
        assert_eq!(files, vec!["README.TXT".to_string()]);

        let mut reader = fs.open_file("\\README.TXT").unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"hello");
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let image = image_with_file();
        let fs = FileSystem::open(Cursor::new(image)).unwrap();
        assert!(!fs.exists("\\NOPE.TXT").unwrap());
        let err = fs.open_file("\\NOPE.TXT").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn opening_a_directory_as_a_file_errors() {
        let image = image_with_file();
        let fs = FileSystem::open(Cursor::new(image)).unwrap();
        let err = fs.open_file("\\").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)) || matches!(err, Error::IsADirectory(_)));
    }
}
