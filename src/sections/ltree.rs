//! `ltree` section: UTF-16LE directory tree for logical (`.L01`) images (§3).
//!
//! The tree's internal file-entry structure (`libewf_single_file_entry`) is
//! out of scope here — this crate treats the tree as a DEFLATE-compressed
//! UTF-16LE text blob, matching the depth the rest of the on-disk engine
//! operates at.

use std::io::{Read, Write};

use crate::codec;
use crate::error::{Error, Result};
use crate::format::CompressionLevel;

pub fn encode(text: &str, level: CompressionLevel) -> Result<Vec<u8>> {
    let utf16le: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    codec::compress(&utf16le, level)
}

pub fn decode(payload: &[u8]) -> Result<String> {
    let raw = codec::decompress(payload)?;
    if raw.len() % 2 != 0 {
        return Err(Error::Corrupt("ltree payload has odd byte length for UTF-16LE".into()));
    }
    let units: Vec<u16> = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|_| Error::Corrupt("ltree payload is not valid UTF-16".into()))
}

pub fn read_from<R: Read>(r: &mut R, payload_size: u64) -> Result<String> {
    let mut payload = vec![0u8; payload_size as usize];
    r.read_exact(&mut payload).map_err(|e| Error::io("reading ltree payload", e))?;
    decode(&payload)
}

pub fn write_to<W: Write>(w: &mut W, text: &str, level: CompressionLevel) -> Result<u64> {
    let bytes = encode(text, level)?;
    w.write_all(&bytes).map_err(|e| Error::io("writing ltree payload", e))?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let tree = "root\n  documents\n  photos\n";
        let bytes = encode(tree, CompressionLevel::Fast).unwrap();
        assert_eq!(decode(&bytes).unwrap(), tree);
    }
}
