use std::ops::Range;

use crate::entry::TarEntry;
use crate::error::{Result, TarError};

/// Archives are sequences of 512-byte blocks.
pub const BLOCK_SIZE: usize = 512;

/// Longest encodable entry name: 99 bytes plus the terminating NUL.
pub const NAME_MAX: usize = 99;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;

const TYPE_FILE: u8 = b'0';
const TYPE_DIR: u8 = b'5';

/// A 512-byte USTAR-subset header block with named field ranges.
///
/// All offset arithmetic lives here; encode and decode only see typed
/// accessors.
#[derive(Debug)]
pub struct HeaderBlock {
    bytes: [u8; BLOCK_SIZE],
}

impl HeaderBlock {
    /// Build the header for an entry, checksum already patched in.
    ///
    /// Names longer than 99 bytes are rejected rather than silently
    /// truncated.
    pub fn for_entry(entry: &TarEntry) -> Result<Self> {
        let name = entry.name.as_bytes();
        if name.len() > NAME_MAX {
            return Err(TarError::NameTooLong {
                name: entry.name.clone(),
                len: name.len(),
            });
        }

        let mut bytes = [0u8; BLOCK_SIZE];
        bytes[..name.len()].copy_from_slice(name);
        write_octal(&mut bytes[MODE], entry.mode as u64);
        // uid/gid are always written as 0
        write_octal(&mut bytes[UID], 0);
        write_octal(&mut bytes[GID], 0);
        write_octal(&mut bytes[SIZE], entry.size);
        write_octal(&mut bytes[MTIME], entry.mtime);
        bytes[TYPEFLAG] = if entry.is_dir { TYPE_DIR } else { TYPE_FILE };

        let mut block = Self { bytes };
        block.patch_checksum();
        Ok(block)
    }

    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bytes
    }

    /// An all-zero block signals end of archive.
    pub fn is_end_marker(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Entry name, NUL- or field-length-terminated.
    pub fn name(&self) -> String {
        let field = &self.bytes[NAME];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }

    pub fn mode(&self) -> u32 {
        parse_octal(&self.bytes[MODE]) as u32
    }

    pub fn size(&self) -> u64 {
        parse_octal(&self.bytes[SIZE])
    }

    pub fn mtime(&self) -> u64 {
        parse_octal(&self.bytes[MTIME])
    }

    pub fn is_dir(&self) -> bool {
        self.bytes[TYPEFLAG] == TYPE_DIR
    }

    /// The checksum value stored in the header field.
    pub fn stored_checksum(&self) -> u64 {
        parse_octal(&self.bytes[CHECKSUM])
    }

    /// Unsigned sum of all 512 bytes with the checksum field read as
    /// eight ASCII spaces.
    pub fn computed_checksum(&self) -> u32 {
        self.bytes
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                if CHECKSUM.contains(&i) {
                    u32::from(b' ')
                } else {
                    u32::from(b)
                }
            })
            .sum()
    }

    fn patch_checksum(&mut self) {
        let sum = self.computed_checksum();
        let digits = format!("{sum:06o}");
        let field = &mut self.bytes[CHECKSUM];
        field[..6].copy_from_slice(digits.as_bytes());
        field[6] = 0;
        field[7] = 0;
    }
}

/// Zero-padded octal ASCII, NUL-terminated, filling the whole field.
fn write_octal(field: &mut [u8], value: u64) {
    let width = field.len() - 1;
    let digits = format!("{value:0width$o}");
    // keep the low digits if the value overflows the field
    let digits = &digits[digits.len() - width..];
    field[..width].copy_from_slice(digits.as_bytes());
    field[width] = 0;
}

/// Parse an octal ASCII field. Blank or unparsable fields default to 0.
pub(crate) fn parse_octal(field: &[u8]) -> u64 {
    let text = String::from_utf8_lossy(field);
    let trimmed = text.trim_matches(|c: char| c == ' ' || c == '\0');
    u64::from_str_radix(trimmed, 8).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_roundtrip() {
        let entry = TarEntry::file("app/config.yml", 0o644, 1_700_000_000, &b"key: value"[..]);
        let block = HeaderBlock::for_entry(&entry).unwrap();

        assert_eq!(block.name(), "app/config.yml");
        assert_eq!(block.mode(), 0o644);
        assert_eq!(block.size(), 10);
        assert_eq!(block.mtime(), 1_700_000_000);
        assert!(!block.is_dir());
        assert!(!block.is_end_marker());
    }

    #[test]
    fn directory_typeflag() {
        let block = HeaderBlock::for_entry(&TarEntry::dir("logs", 0o755, 0)).unwrap();
        assert!(block.is_dir());
        assert_eq!(block.name(), "logs/");
        assert_eq!(block.size(), 0);
    }

    #[test]
    fn checksum_matches_spaces_blanked_sum() {
        let entry = TarEntry::file("a.txt", 0o600, 42, &b"x"[..]);
        let block = HeaderBlock::for_entry(&entry).unwrap();

        assert_eq!(u64::from(block.computed_checksum()), block.stored_checksum());
        // 6 octal digits, NUL, NUL
        let field = &block.as_bytes()[148..156];
        assert!(field[..6].iter().all(|b| (b'0'..=b'7').contains(b)));
        assert_eq!(field[6], 0);
        assert_eq!(field[7], 0);
    }

    #[test]
    fn long_name_is_rejected() {
        let name = "d/".repeat(60);
        let err = HeaderBlock::for_entry(&TarEntry::file(name, 0o644, 0, &b""[..])).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TarError::NameTooLong { len: 120, .. }
        ));
    }

    #[test]
    fn name_of_exactly_99_bytes_fits() {
        let name = "f".repeat(99);
        let block = HeaderBlock::for_entry(&TarEntry::file(name.clone(), 0o644, 0, &b""[..]));
        assert_eq!(block.unwrap().name(), name);
    }

    #[test]
    fn octal_parsing_defaults_to_zero() {
        assert_eq!(parse_octal(b"        "), 0);
        assert_eq!(parse_octal(b"\0\0\0\0\0\0\0\0"), 0);
        assert_eq!(parse_octal(b"banana!\0"), 0);
        assert_eq!(parse_octal(b"0000755\0"), 0o755);
        assert_eq!(parse_octal(b" 644 \0\0\0"), 0o644);
    }

    #[test]
    fn octal_overflow_keeps_low_digits() {
        let mut field = [0u8; 4];
        write_octal(&mut field, 0o7777);
        assert_eq!(&field, b"777\0");
    }
}
