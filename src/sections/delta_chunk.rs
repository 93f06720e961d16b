//! `delta_chunk` section: a later re-write of one chunk, stored in a `.Dxx`
//! segment chain (§3, §4.7).

use std::io::{Read, Write};

use crate::checksum::adler32;
use crate::error::{ChecksumSubject, Error, Result};

/// Header fields that precede the raw chunk bytes inside a `delta_chunk` payload:
/// 4-byte chunk index (1-based), 4-byte chunk size, 6-byte padding, 4-byte checksum.
pub const DELTA_CHUNK_HEADER_SIZE: usize = 4 + 4 + 6 + 4;

#[derive(Debug, Clone, Copy)]
pub struct DeltaChunkHeader {
    /// 1-based chunk index, as stored on disk.
    pub chunk_number_one_based: u32,
    pub chunk_size: u32,
}

impl DeltaChunkHeader {
    pub fn to_bytes(self) -> [u8; DELTA_CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; DELTA_CHUNK_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.chunk_number_one_based.to_le_bytes());
        buf[4..8].copy_from_slice(&self.chunk_size.to_le_bytes());
        // bytes [8..14) are padding.
        let checksum = adler32(&buf[..14]);
        buf[14..18].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<(Self, bool)> {
        let mut buf = [0u8; DELTA_CHUNK_HEADER_SIZE];
        r.read_exact(&mut buf)
            .map_err(|e| Error::io("reading delta_chunk header", e))?;
        let chunk_number_one_based = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let chunk_size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let stored = u32::from_le_bytes(buf[14..18].try_into().unwrap());
        let ok = adler32(&buf[..14]) == stored;
        Ok((
            Self {
                chunk_number_one_based,
                chunk_size,
            },
            ok,
        ))
    }
}

/// Writes a full `delta_chunk` payload: header + raw chunk bytes + trailing checksum.
pub fn write_to<W: Write>(w: &mut W, chunk_number_one_based: u32, chunk: &[u8]) -> Result<u64> {
    let header = DeltaChunkHeader {
        chunk_number_one_based,
        chunk_size: chunk.len() as u32,
    };
    let header_bytes = header.to_bytes();
    w.write_all(&header_bytes)
        .map_err(|e| Error::io("writing delta_chunk header", e))?;
    w.write_all(chunk)
        .map_err(|e| Error::io("writing delta_chunk payload", e))?;
    let checksum = adler32(chunk);
    w.write_all(&checksum.to_le_bytes())
        .map_err(|e| Error::io("writing delta_chunk checksum", e))?;
    Ok(header_bytes.len() as u64 + chunk.len() as u64 + 4)
}

/// Reads a full `delta_chunk` payload, verifying the chunk checksum.
pub fn read_from<R: Read>(r: &mut R, where_: &str) -> Result<(u32, Vec<u8>)> {
    let (header, header_ok) = DeltaChunkHeader::read_from(r)?;
    if !header_ok {
        return Err(Error::ChecksumMismatch {
            subject: ChecksumSubject::SectionHeader,
            where_: where_.to_string(),
            expected: 0,
            found: 0,
        });
    }
    let mut chunk = vec![0u8; header.chunk_size as usize];
    r.read_exact(&mut chunk)
        .map_err(|e| Error::io("reading delta_chunk payload", e))?;
    let mut stored = [0u8; 4];
    r.read_exact(&mut stored)
        .map_err(|e| Error::io("reading delta_chunk checksum", e))?;
    let stored = u32::from_le_bytes(stored);
    let computed = adler32(&chunk);
    if stored != computed {
        return Err(Error::ChecksumMismatch {
            subject: ChecksumSubject::Chunk,
            where_: where_.to_string(),
            expected: stored,
            found: computed,
        });
    }
    Ok((header.chunk_number_one_based, chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip() {
        let chunk = vec![0xAB; 4096];
        let mut buf = Vec::new();
        write_to(&mut buf, 3, &chunk).unwrap();
        let mut cursor = Cursor::new(buf);
        let (number, data) = read_from(&mut cursor, "test").unwrap();
        assert_eq!(number, 3);
        assert_eq!(data, chunk);
    }

    #[test]
    fn detects_chunk_corruption() {
        let chunk = vec![0x11; 16];
        let mut buf = Vec::new();
        write_to(&mut buf, 1, &chunk).unwrap();
        let last = buf.len() - 5;
        buf[last] ^= 0xFF;
        let mut cursor = Cursor::new(buf);
        assert!(read_from(&mut cursor, "test").is_err());
    }
}
