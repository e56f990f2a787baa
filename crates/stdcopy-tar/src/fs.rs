use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::Bytes;

use crate::archive::{decode, encode};
use crate::entry::TarEntry;
use crate::error::{Result, TarError};

#[cfg(not(unix))]
const DEFAULT_FILE_MODE: u32 = 0o644;
#[cfg(not(unix))]
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Recursively collect a file or directory tree into archive entries.
///
/// Directories yield a zero-size entry (trailing slash) before their
/// children; files carry their full contents. Names are `/`-separated and
/// relative to the root's parent, so the root's own name is the first
/// path segment. Children are visited in name order for deterministic
/// archives.
pub fn pack_path(root: &Path) -> Result<Vec<TarEntry>> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let meta = fs::metadata(root)?;

    let mut entries = Vec::new();
    if meta.is_dir() {
        entries.push(TarEntry::dir(name.clone(), dir_mode(&meta), mtime_of(&meta)));
        pack_children(root, &name, &mut entries)?;
    } else {
        let data = fs::read(root)?;
        entries.push(TarEntry::file(name, file_mode(&meta), mtime_of(&meta), data));
    }
    Ok(entries)
}

fn pack_children(dir: &Path, prefix: &str, entries: &mut Vec<TarEntry>) -> Result<()> {
    let mut children = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    children.sort_by_key(|child| child.file_name());

    for child in children {
        let name = format!("{prefix}/{}", child.file_name().to_string_lossy());
        let meta = child.metadata()?;
        if meta.is_dir() {
            entries.push(TarEntry::dir(name.clone(), dir_mode(&meta), mtime_of(&meta)));
            pack_children(&child.path(), &name, entries)?;
        } else {
            let data = fs::read(child.path())?;
            entries.push(TarEntry::file(name, file_mode(&meta), mtime_of(&meta), data));
        }
    }
    Ok(())
}

/// Pack a path and serialize it in one step.
pub fn archive_path(root: &Path) -> Result<Bytes> {
    encode(&pack_path(root)?)
}

/// Extract an archive under `dest`, creating intermediate directories as
/// needed, in archive order.
///
/// Entry names that resolve outside `dest` (absolute paths or `..`
/// segments) are rejected.
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<()> {
    for entry in decode(bytes) {
        let target = dest.join(relative_name(&entry.name)?);
        if entry.is_dir {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &entry.data)?;
        }
        tracing::debug!(name = %entry.name, size = entry.size, "extracted entry");
    }
    Ok(())
}

fn relative_name(name: &str) -> Result<PathBuf> {
    let path = Path::new(name.trim_start_matches('/'));
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(TarError::PathEscape {
                    name: name.to_string(),
                })
            }
        }
    }
    Ok(path.to_path_buf())
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(unix)]
fn dir_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    DEFAULT_FILE_MODE
}

#[cfg(not(unix))]
fn dir_mode(_meta: &fs::Metadata) -> u32 {
    DEFAULT_DIR_MODE
}

fn mtime_of(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
