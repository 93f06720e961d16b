//! The 76-byte section descriptor that precedes every section payload (§6).

use std::io::{Read, Write};

use crate::checksum::adler32;
use crate::error::{ChecksumSubject, Error, Result};

pub const SECTION_HEADER_SIZE: u64 = 76;
const TYPE_FIELD_LEN: usize = 16;

/// A parsed (or about-to-be-written) section descriptor.
#[derive(Debug, Clone)]
pub struct SectionHeader {
    /// NUL-stripped ASCII type name, e.g. `"table"`, `"next"`, `"done"`.
    pub type_name: String,
    /// Absolute file offset of the next section's descriptor (self for `next`/`done`).
    pub next_offset: u64,
    /// Total section size in bytes, including this 76-byte header.
    pub size: u64,
}

impl SectionHeader {
    pub fn new(type_name: impl Into<String>, next_offset: u64, size: u64) -> Self {
        Self {
            type_name: type_name.into(),
            next_offset,
            size,
        }
    }

    /// Serializes to the on-disk 76-byte representation, including the trailing checksum.
    pub fn to_bytes(&self) -> Result<[u8; SECTION_HEADER_SIZE as usize]> {
        if self.type_name.len() > TYPE_FIELD_LEN - 1 {
            return Err(Error::InvalidFormat(format!(
                "section type name {:?} exceeds {} bytes",
                self.type_name,
                TYPE_FIELD_LEN - 1
            )));
        }

        let mut buf = [0u8; SECTION_HEADER_SIZE as usize];
        buf[..self.type_name.len()].copy_from_slice(self.type_name.as_bytes());
        buf[16..24].copy_from_slice(&self.next_offset.to_le_bytes());
        buf[24..32].copy_from_slice(&self.size.to_le_bytes());
        // bytes [32..72) are the zeroed padding/reserved region.
        let checksum = adler32(&buf[..72]);
        buf[72..76].copy_from_slice(&checksum.to_le_bytes());
        Ok(buf)
    }

    /// Writes the header to `w` and returns the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<u64> {
        let bytes = self.to_bytes()?;
        w.write_all(&bytes)
            .map_err(|e| Error::io("writing section header", e))?;
        Ok(SECTION_HEADER_SIZE)
    }

    /// Reads a section header from `r` at the caller's current position.
    ///
    /// A checksum mismatch is reported through `on_checksum_mismatch` but does
    /// not stop parsing — per §4.3 a single bad header must not poison the
    /// image when the rest of the section list is intact.
    pub fn read_from<R: Read>(
        r: &mut R,
        where_: &str,
        mut on_checksum_mismatch: impl FnMut(u32, u32),
    ) -> Result<Self> {
        let mut buf = [0u8; SECTION_HEADER_SIZE as usize];
        r.read_exact(&mut buf)
            .map_err(|e| Error::io(format!("reading section header at {where_}"), e))?;

        let mut type_name =
            String::from_utf8(buf[..TYPE_FIELD_LEN].to_vec()).map_err(|_| {
                Error::InvalidFormat(format!("non-UTF8 section type at {where_}"))
            })?;
        type_name.retain(|c| c != '\0');

        let next_offset = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        let size = u64::from_le_bytes(buf[24..32].try_into().unwrap());
        let stored_checksum = u32::from_le_bytes(buf[72..76].try_into().unwrap());
        let computed_checksum = adler32(&buf[..72]);

        if stored_checksum != computed_checksum {
            on_checksum_mismatch(stored_checksum, computed_checksum);
        }

        Ok(Self {
            type_name,
            next_offset,
            size,
        })
    }

    /// Like [`Self::read_from`] but returns `ChecksumMismatch` instead of delegating
    /// to a callback; used by code paths where a bad header truly is fatal
    /// (e.g. double-checking a freshly written header in tests).
    pub fn read_strict<R: Read>(r: &mut R, where_: &str) -> Result<Self> {
        let mut err = None;
        let header = Self::read_from(r, where_, |expected, found| {
            err = Some(Error::ChecksumMismatch {
                subject: ChecksumSubject::SectionHeader,
                where_: where_.to_string(),
                expected,
                found,
            });
        })?;
        match err {
            Some(e) => Err(e),
            None => Ok(header),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip() {
        let h = SectionHeader::new("table", 1234, 5678);
        let bytes = h.to_bytes().unwrap();
        assert_eq!(bytes.len(), 76);
        let mut cursor = Cursor::new(bytes.to_vec());
        let back = SectionHeader::read_strict(&mut cursor, "test").unwrap();
        assert_eq!(back.type_name, "table");
        assert_eq!(back.next_offset, 1234);
        assert_eq!(back.size, 5678);
    }

    #[test]
    fn detects_tampering() {
        let h = SectionHeader::new("next", 100, 76);
        let mut bytes = h.to_bytes().unwrap();
        bytes[20] ^= 0xFF;
        let mut cursor = Cursor::new(bytes.to_vec());
        assert!(SectionHeader::read_strict(&mut cursor, "test").is_err());
    }

    #[test]
    fn rejects_overlong_type() {
        let h = SectionHeader::new("a_type_name_too_long", 0, 76);
        assert!(h.to_bytes().is_err());
    }
}
