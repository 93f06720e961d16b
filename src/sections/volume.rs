//! `volume` / `disk` / `data` section codec (§3, §4.3).
//!
//! The payload size discriminates the flavor: the SMART struct is smaller
//! than the EnCase struct, so a reader that only knows the section's total
//! size can already tell S01 from E01 apart.

use std::io::{Read, Write};

use crate::checksum::adler32;
use crate::error::{ChecksumSubject, Error, Result};
use crate::format::Format;
use crate::media::{MediaType, MediaValues};

/// Total payload size (header excluded) of an EWF-S01 `volume` section.
pub const SMART_VOLUME_SIZE: usize = 94;
/// Total payload size (header excluded) of an EnCase `volume`/`disk` section.
pub const ENCASE_VOLUME_SIZE: usize = 1052;

const GUID_OFFSET: usize = 25;
const MAGIC_OFFSET: usize = 41;
const MAGIC_LEN: usize = 5;
const SMART_MAGIC: &[u8; MAGIC_LEN] = b"SMART";

/// Decides which payload size to use for a freshly written `volume` section.
pub fn payload_size_for(format: Format) -> usize {
    if format.is_smart_flavor() {
        SMART_VOLUME_SIZE
    } else {
        ENCASE_VOLUME_SIZE
    }
}

/// Tells S01 from E01/EnCase purely from the section's declared payload size (§4.3).
pub fn flavor_from_payload_size(size: usize) -> Result<bool /* is_smart */> {
    match size {
        SMART_VOLUME_SIZE => Ok(true),
        ENCASE_VOLUME_SIZE => Ok(false),
        other => Err(Error::InvalidFormat(format!(
            "volume section payload size {other} matches neither SMART ({SMART_VOLUME_SIZE}) nor EnCase ({ENCASE_VOLUME_SIZE})"
        ))),
    }
}

/// Serializes `media` into a `volume`/`disk`/`data` payload of `payload_size` bytes.
pub fn encode(media: &MediaValues, payload_size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; payload_size];
    buf[0] = media.media_type.to_byte();
    buf[1] = media.media_flags;
    buf[4..8].copy_from_slice(&media.number_of_chunks.to_le_bytes());
    buf[8..12].copy_from_slice(&media.sectors_per_chunk.to_le_bytes());
    buf[12..16].copy_from_slice(&media.bytes_per_sector.to_le_bytes());
    buf[16..20].copy_from_slice(&media.number_of_sectors.to_le_bytes());
    buf[20..24].copy_from_slice(&media.error_granularity.to_le_bytes());
    buf[24] = media.compression_level;
    buf[GUID_OFFSET..GUID_OFFSET + 16].copy_from_slice(&media.guid);
    if payload_size == SMART_VOLUME_SIZE {
        buf[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN].copy_from_slice(SMART_MAGIC);
    }
    let checksum = adler32(&buf[..payload_size - 4]);
    buf[payload_size - 4..].copy_from_slice(&checksum.to_le_bytes());
    buf
}

/// Parses a `volume`/`disk`/`data` payload, returning the media values and
/// whether the checksum verified.
pub fn decode(payload: &[u8], format_hint: Format) -> Result<(MediaValues, bool)> {
    if payload.len() < 46 {
        return Err(Error::InvalidFormat("volume payload too short".into()));
    }
    let checksum_ok = {
        let stored = u32::from_le_bytes(payload[payload.len() - 4..].try_into().unwrap());
        let computed = adler32(&payload[..payload.len() - 4]);
        stored == computed
    };

    let number_of_chunks = u32::from_le_bytes(payload[4..8].try_into().unwrap());
    let sectors_per_chunk = u32::from_le_bytes(payload[8..12].try_into().unwrap());
    let bytes_per_sector = u32::from_le_bytes(payload[12..16].try_into().unwrap());
    let number_of_sectors = u32::from_le_bytes(payload[16..20].try_into().unwrap());
    let error_granularity = u32::from_le_bytes(payload[20..24].try_into().unwrap());
    let compression_level = payload[24];
    let mut guid = [0u8; 16];
    guid.copy_from_slice(&payload[GUID_OFFSET..GUID_OFFSET + 16]);

    let media = MediaValues {
        media_size: number_of_sectors as u64 * bytes_per_sector as u64,
        chunk_size: sectors_per_chunk * bytes_per_sector,
        sectors_per_chunk,
        bytes_per_sector,
        number_of_chunks,
        number_of_sectors,
        media_type: MediaType::from_byte(payload[0]),
        media_flags: payload[1],
        error_granularity,
        guid,
        compression_level,
        format: format_hint,
    };
    Ok((media, checksum_ok))
}

/// Reads a `volume`/`disk`/`data` payload from `r`, raising `ChecksumMismatch`
/// (but still returning the parsed values) if the trailing checksum fails.
pub fn read_from<R: Read>(
    r: &mut R,
    payload_size: u64,
    where_: &str,
) -> Result<(MediaValues, Option<Error>)> {
    let is_smart = flavor_from_payload_size(payload_size as usize)?;
    let format_hint = if is_smart { Format::Smart } else { Format::Encase6 };
    let mut payload = vec![0u8; payload_size as usize];
    r.read_exact(&mut payload)
        .map_err(|e| Error::io(format!("reading volume payload at {where_}"), e))?;
    let (media, ok) = decode(&payload, format_hint)?;
    let err = if ok {
        None
    } else {
        let stored = u32::from_le_bytes(payload[payload.len() - 4..].try_into().unwrap());
        let computed = adler32(&payload[..payload.len() - 4]);
        Some(Error::ChecksumMismatch {
            subject: ChecksumSubject::Table,
            where_: where_.to_string(),
            expected: stored,
            found: computed,
        })
    };
    Ok((media, err))
}

pub fn write_to<W: Write>(w: &mut W, media: &MediaValues, format: Format) -> Result<u64> {
    let payload_size = payload_size_for(format);
    let bytes = encode(media, payload_size);
    w.write_all(&bytes)
        .map_err(|e| Error::io("writing volume payload", e))?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(format: Format) -> MediaValues {
        MediaValues::new(131_072, 64, 512, format)
    }

    #[test]
    fn roundtrip_smart() {
        let media = sample(Format::Smart);
        let bytes = encode(&media, SMART_VOLUME_SIZE);
        assert_eq!(bytes.len(), SMART_VOLUME_SIZE);
        let (back, ok) = decode(&bytes, Format::Smart).unwrap();
        assert!(ok);
        assert_eq!(back.number_of_chunks, media.number_of_chunks);
        assert_eq!(back.sectors_per_chunk, 64);
        assert_eq!(back.bytes_per_sector, 512);
    }

    #[test]
    fn roundtrip_encase() {
        let media = sample(Format::Encase6);
        let bytes = encode(&media, ENCASE_VOLUME_SIZE);
        assert_eq!(bytes.len(), ENCASE_VOLUME_SIZE);
        let (back, ok) = decode(&bytes, Format::Encase6).unwrap();
        assert!(ok);
        assert_eq!(back.number_of_sectors, media.number_of_sectors);
    }

    #[test]
    fn flavor_detection() {
        assert!(flavor_from_payload_size(SMART_VOLUME_SIZE).unwrap());
        assert!(!flavor_from_payload_size(ENCASE_VOLUME_SIZE).unwrap());
        assert!(flavor_from_payload_size(12).is_err());
    }

    #[test]
    fn detects_tampering() {
        let media = sample(Format::Smart);
        let mut bytes = encode(&media, SMART_VOLUME_SIZE);
        bytes[5] ^= 0xFF;
        let (_, ok) = decode(&bytes, Format::Smart).unwrap();
        assert!(!ok);
    }
}
