//! The per-chunk compression pipeline: classify, compress, cache.
//!
//! DEFLATE itself is an external collaborator (§1); this module only owns
//! the policy of *when* to compress a chunk and the small cache that reuses
//! the compressed form of the first all-zero block an image sees.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::format::CompressionLevel;

/// Compress `input` at the given level, wrapped as zlib (the encoding
/// `header`/`header2`/`xheader` and chunk payloads both use).
pub fn compress(input: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level.to_flate2());
    encoder
        .write_all(input)
        .map_err(|e| Error::io("compressing chunk", e))?;
    encoder
        .finish()
        .map_err(|e| Error::io("finishing chunk compression", e))
}

/// Inflate a zlib-wrapped buffer. `Corrupt` on a malformed stream.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(input);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Corrupt(format!("zlib inflate failed: {e}")))?;
    Ok(out)
}

/// Returns `true` when every byte in `data` is identical (the "empty block"
/// classification from §4.1 — cheap and catches the common all-zero case as
/// well as any other uniformly-filled chunk).
pub fn is_empty_block(data: &[u8]) -> bool {
    match data.first() {
        None => true,
        Some(&first) => data.iter().all(|&b| b == first),
    }
}

/// Caches the compressed form of the first all-zero chunk seen by a write
/// handle, keyed on chunk size + compression level. Sparse media re-acquires
/// the same zeroed chunk thousands of times; this avoids re-running DEFLATE
/// on it every time.
#[derive(Default)]
pub struct ZeroBlockCache {
    entry: Option<(usize, CompressionLevel, Vec<u8>)>,
}

impl ZeroBlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached compressed zero-block for `(chunk_size, level)` if present.
    pub fn get(&self, chunk_size: usize, level: CompressionLevel) -> Option<&[u8]> {
        match &self.entry {
            Some((size, lvl, data)) if *size == chunk_size && *lvl == level => Some(data),
            _ => None,
        }
    }

    pub fn store(&mut self, chunk_size: usize, level: CompressionLevel, compressed: Vec<u8>) {
        self.entry = Some((chunk_size, level, compressed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = compress(&data, CompressionLevel::Best).unwrap();
        assert!(compressed.len() < data.len());
        let back = decompress(&compressed).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn detects_empty_block() {
        assert!(is_empty_block(&[0u8; 4096]));
        assert!(is_empty_block(&[0xFFu8; 4096]));
        assert!(is_empty_block(&[]));
        let mut mixed = vec![0u8; 4096];
        mixed[2000] = 1;
        assert!(!is_empty_block(&mixed));
    }

    #[test]
    fn cache_hits_on_matching_key() {
        let mut cache = ZeroBlockCache::new();
        assert!(cache.get(32768, CompressionLevel::Fast).is_none());
        cache.store(32768, CompressionLevel::Fast, vec![1, 2, 3]);
        assert_eq!(cache.get(32768, CompressionLevel::Fast), Some(&[1u8, 2, 3][..]));
        assert!(cache.get(32768, CompressionLevel::Best).is_none());
        assert!(cache.get(16384, CompressionLevel::Fast).is_none());
    }
}
