/// Errors from archive encoding and filesystem transfer.
#[derive(Debug, thiserror::Error)]
pub enum TarError {
    /// The entry name does not fit the 100-byte USTAR name field.
    #[error("entry name too long ({len} bytes, max 99): {name}")]
    NameTooLong { name: String, len: usize },

    /// The archive entry would extract outside the destination directory.
    #[error("entry path escapes the destination: {name}")]
    PathEscape { name: String },

    /// An I/O error occurred while reading or writing the filesystem.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TarError>;
