//! `error2` section: acquisition-error sector ranges (§3, §7).

use std::io::{Read, Write};

use crate::checksum::adler32;
use crate::error::{Error, Result};

/// One range of source-media sectors that could not be read cleanly during acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEntry {
    pub first_sector: u32,
    pub number_of_sectors: u32,
}

pub fn encode(entries: &[ErrorEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + entries.len() * 8 + 4);
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.first_sector.to_le_bytes());
        buf.extend_from_slice(&e.number_of_sectors.to_le_bytes());
    }
    let checksum = adler32(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

pub fn decode(payload: &[u8]) -> Result<Vec<ErrorEntry>> {
    if payload.len() < 4 {
        return Err(Error::InvalidFormat("error2 payload too short".into()));
    }
    let count = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    let expected_len = 4 + count * 8 + 4;
    if payload.len() < expected_len {
        return Err(Error::InvalidFormat("error2 payload truncated".into()));
    }
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let start = 4 + i * 8;
        entries.push(ErrorEntry {
            first_sector: u32::from_le_bytes(payload[start..start + 4].try_into().unwrap()),
            number_of_sectors: u32::from_le_bytes(payload[start + 4..start + 8].try_into().unwrap()),
        });
    }
    Ok(entries)
}

pub fn read_from<R: Read>(r: &mut R, payload_size: u64) -> Result<Vec<ErrorEntry>> {
    let mut payload = vec![0u8; payload_size as usize];
    r.read_exact(&mut payload)
        .map_err(|e| Error::io("reading error2 payload", e))?;
    decode(&payload)
}

pub fn write_to<W: Write>(w: &mut W, entries: &[ErrorEntry]) -> Result<u64> {
    let bytes = encode(entries);
    w.write_all(&bytes).map_err(|e| Error::io("writing error2 payload", e))?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let entries = vec![ErrorEntry { first_sector: 6400, number_of_sectors: 64 }];
        let bytes = encode(&entries);
        assert_eq!(decode(&bytes).unwrap(), entries);
    }
}
