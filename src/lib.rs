//! Read-only ECMA-119 (ISO 9660) image reader.
//!
//! Mounts an optical-disc image from any `Read + Seek` byte source and
//! exposes it as a small, read-only filesystem: directory listing, path
//! resolution with wildcard enumeration, and seekable file streams.
//! Joliet and Rock Ridge (SUSP/RRIP) extensions are detected and preferred
//! automatically — see [`fs::FileSystem::open`] for the selection order.
//!
//! ```no_run
//! use std::fs::File;
//! use isoview::FileSystem;
//!
//! let image = File::open("disc.iso")?;
//! let fs = FileSystem::open(image)?;
//! for name in fs.get_files("\\", None, true)? {
//!     println!("{name}");
//! }
//! # Ok::<(), isoview::Error>(())
//! ```

pub mod codec;
pub mod constants;
pub mod context;
pub mod directory;
pub mod error;
pub mod fs;
pub mod reader;
pub mod record;
pub mod stream;
pub mod susp;
pub mod vfs;
pub mod volume;

pub use error::{Error, Result};
pub use fs::FileSystem;
pub use reader::{Reader, Variant};

/// Crate version, exposed for parity with how callers often surface it in
/// diagnostics or a `--version` flag of their own.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
