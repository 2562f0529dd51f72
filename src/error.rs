use std::path::PathBuf;

/// Error type for all read-only ISO 9660 operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sector 16 did not carry the `CD001` standard identifier.
    #[error("not an ISO 9660 image: standard identifier mismatch")]
    NotIso9660,

    /// A descriptor, record, or SUSP chain was truncated or internally inconsistent.
    #[error("malformed ISO 9660 image: {0}")]
    Malformed(String),

    /// None of the variant priorities (Joliet, Rock Ridge, ISO 9660) were satisfied.
    #[error("no supported filesystem variant found in volume descriptor set")]
    NoSupportedVariant,

    /// A path component did not resolve to any directory entry.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// A path component did not resolve to any directory entry, and a directory was expected.
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// A path component resolved to a file where a directory was required.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A path resolved to a directory where a file was required.
    #[error("is a directory: {0}")]
    IsADirectory(PathBuf),

    /// A write, create, or non-contiguous-extent operation was attempted.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Rock Ridge symlink resolution exceeded the hop bound.
    #[error("symlink resolution loop detected for: {0}")]
    SymlinkLoop(PathBuf),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
