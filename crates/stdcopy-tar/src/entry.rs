use bytes::Bytes;

/// One named, typed record within an archive.
///
/// Invariant: `is_dir` implies `size == 0` and empty `data`. The
/// constructors uphold it; decoding reproduces whatever the archive
/// declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    /// POSIX path, `/`-separated regardless of host convention.
    /// At most 99 bytes on encode; directories carry a trailing `/`.
    pub name: String,
    /// Payload byte length. 0 for directories.
    pub size: u64,
    /// POSIX permission bits.
    pub mode: u32,
    /// Modification time, POSIX epoch seconds.
    pub mtime: u64,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// Owned payload bytes. Empty for directories and zero-size files.
    pub data: Bytes,
}

impl TarEntry {
    /// A regular file entry carrying its full contents.
    pub fn file(name: impl Into<String>, mode: u32, mtime: u64, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            mode,
            mtime,
            is_dir: false,
            data,
        }
    }

    /// A directory entry. Appends the conventional trailing slash if the
    /// name lacks one.
    pub fn dir(name: impl Into<String>, mode: u32, mtime: u64) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            size: 0,
            mode,
            mtime,
            is_dir: true,
            data: Bytes::new(),
        }
    }
}
