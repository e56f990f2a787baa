//! USTAR-subset archive codec for filesystem copy endpoints.
//!
//! Files and directories move to and from the remote filesystem as opaque
//! TAR blobs: 512-byte blocks, fixed field offsets, two zero blocks at the
//! end. Encoding is strict (long names are rejected); decoding is lenient
//! (garbage octal parses as 0, checksums are never re-validated, short
//! input ends the archive silently).

pub mod archive;
pub mod entry;
pub mod error;
pub mod fs;
pub mod header;

pub use archive::{decode, encode};
pub use entry::TarEntry;
pub use error::{Result, TarError};
pub use fs::{archive_path, pack_path, unpack};
pub use header::{HeaderBlock, BLOCK_SIZE, NAME_MAX};
