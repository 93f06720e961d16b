//! `hash` / `digest` / `xhash` section codecs: integrity digests over the
//! whole acquired stream (§3, §4.6).

use std::io::{Read, Write};

use crate::checksum::adler32;
use crate::error::{Error, Result};

pub const HASH_PAYLOAD_SIZE: usize = 16 + 4; // MD5 + checksum
pub const DIGEST_PAYLOAD_SIZE: usize = 16 + 20 + 4; // MD5 + SHA-1 + checksum

pub fn encode_hash(md5: &[u8; 16]) -> Vec<u8> {
    let mut buf = md5.to_vec();
    let checksum = adler32(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

pub fn decode_hash(payload: &[u8]) -> Result<[u8; 16]> {
    if payload.len() < HASH_PAYLOAD_SIZE {
        return Err(Error::InvalidFormat("hash payload too short".into()));
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&payload[..16]);
    Ok(md5)
}

pub fn encode_digest(md5: &[u8; 16], sha1: &[u8; 20]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DIGEST_PAYLOAD_SIZE);
    buf.extend_from_slice(md5);
    buf.extend_from_slice(sha1);
    let checksum = adler32(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

pub fn decode_digest(payload: &[u8]) -> Result<([u8; 16], [u8; 20])> {
    if payload.len() < DIGEST_PAYLOAD_SIZE {
        return Err(Error::InvalidFormat("digest payload too short".into()));
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&payload[..16]);
    let mut sha1 = [0u8; 20];
    sha1.copy_from_slice(&payload[16..36]);
    Ok((md5, sha1))
}

pub fn write_hash<W: Write>(w: &mut W, md5: &[u8; 16]) -> Result<u64> {
    let bytes = encode_hash(md5);
    w.write_all(&bytes).map_err(|e| Error::io("writing hash payload", e))?;
    Ok(bytes.len() as u64)
}

pub fn write_digest<W: Write>(w: &mut W, md5: &[u8; 16], sha1: &[u8; 20]) -> Result<u64> {
    let bytes = encode_digest(md5, sha1);
    w.write_all(&bytes).map_err(|e| Error::io("writing digest payload", e))?;
    Ok(bytes.len() as u64)
}

pub fn read_hash<R: Read>(r: &mut R, payload_size: u64) -> Result<[u8; 16]> {
    let mut payload = vec![0u8; payload_size as usize];
    r.read_exact(&mut payload).map_err(|e| Error::io("reading hash payload", e))?;
    decode_hash(&payload)
}

pub fn read_digest<R: Read>(r: &mut R, payload_size: u64) -> Result<([u8; 16], [u8; 20])> {
    let mut payload = vec![0u8; payload_size as usize];
    r.read_exact(&mut payload).map_err(|e| Error::io("reading digest payload", e))?;
    decode_digest(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_roundtrip() {
        let md5 = [7u8; 16];
        let bytes = encode_hash(&md5);
        assert_eq!(decode_hash(&bytes).unwrap(), md5);
    }

    #[test]
    fn digest_roundtrip() {
        let md5 = [1u8; 16];
        let sha1 = [2u8; 20];
        let bytes = encode_digest(&md5, &sha1);
        assert_eq!(decode_digest(&bytes).unwrap(), (md5, sha1));
    }
}
