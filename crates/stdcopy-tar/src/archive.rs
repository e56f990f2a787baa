use bytes::{BufMut, Bytes, BytesMut};

use crate::entry::TarEntry;
use crate::error::Result;
use crate::header::{HeaderBlock, BLOCK_SIZE};

/// Serialize entries, in order, into a single archive.
///
/// Each entry gets a 512-byte header; file payloads are zero-padded to the
/// next block boundary; two zero blocks terminate the archive. The caller
/// keeps ownership of the entry buffers.
pub fn encode(entries: &[TarEntry]) -> Result<Bytes> {
    let mut out = BytesMut::new();
    for entry in entries {
        let header = HeaderBlock::for_entry(entry)?;
        out.put_slice(header.as_bytes());

        if !entry.is_dir && !entry.data.is_empty() {
            out.put_slice(&entry.data);
            let rem = entry.data.len() % BLOCK_SIZE;
            if rem != 0 {
                out.put_bytes(0, BLOCK_SIZE - rem);
            }
        }
    }
    out.put_bytes(0, BLOCK_SIZE * 2);
    Ok(out.freeze())
}

/// Parse an archive back into entries.
///
/// Reads 512-byte blocks sequentially; a single all-zero block terminates.
/// Checksums are never re-validated. Blank or garbage octal fields parse
/// as 0. A short read — at a header or payload boundary — stops decoding
/// silently, yielding only the entries already produced.
pub fn decode(bytes: &[u8]) -> Vec<TarEntry> {
    let mut entries = Vec::new();
    let mut pos = 0;

    loop {
        let Some(block) = take_block(bytes, &mut pos) else {
            break;
        };
        let header = HeaderBlock::from_bytes(block);
        if header.is_end_marker() {
            break;
        }

        let size = header.size() as usize;
        let data = if size == 0 {
            Bytes::new()
        } else {
            if pos + size > bytes.len() {
                // Truncated payload: no partial entry.
                break;
            }
            let data = Bytes::copy_from_slice(&bytes[pos..pos + size]);
            pos += size;
            let rem = size % BLOCK_SIZE;
            if rem != 0 {
                pos += BLOCK_SIZE - rem;
            }
            data
        };

        entries.push(TarEntry {
            name: header.name(),
            size: size as u64,
            mode: header.mode(),
            mtime: header.mtime(),
            is_dir: header.is_dir(),
            data,
        });
    }

    entries
}

fn take_block(bytes: &[u8], pos: &mut usize) -> Option<[u8; BLOCK_SIZE]> {
    let block = bytes.get(*pos..*pos + BLOCK_SIZE)?;
    *pos += BLOCK_SIZE;
    Some(block.try_into().expect("block-sized slice"))
}
