//! Per-image constants persisted in `volume`/`disk`/`data` sections (§3).

use crate::format::Format;

/// Media type byte, as EWF defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Removable,
    Fixed,
    Optical,
    Logical,
}

impl MediaType {
    pub fn to_byte(self) -> u8 {
        match self {
            MediaType::Removable => 0x00,
            MediaType::Fixed => 0x0C,
            MediaType::Optical => 0x01,
            MediaType::Logical => 0x0E,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            0x0C => MediaType::Fixed,
            0x01 => MediaType::Optical,
            0x0E => MediaType::Logical,
            _ => MediaType::Removable,
        }
    }
}

/// Flags persisted in the `volume`/`data` section's `media_flags` byte.
pub mod media_flags {
    pub const IMAGE: u8 = 0x01;
    pub const PHYSICAL: u8 = 0x02;
    pub const FASTBLOC_WRITE_BLOCKED: u8 = 0x04;
    pub const TABLEAU_WRITE_BLOCKED: u8 = 0x08;
}

/// Per-image constants, immutable once the first section is written (§3).
#[derive(Debug, Clone)]
pub struct MediaValues {
    pub media_size: u64,
    pub chunk_size: u32,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub number_of_chunks: u32,
    pub number_of_sectors: u32,
    pub media_type: MediaType,
    pub media_flags: u8,
    pub error_granularity: u32,
    pub guid: [u8; 16],
    pub compression_level: u8,
    pub format: Format,
}

impl MediaValues {
    /// Builds a fresh set of media values for a new acquisition.
    ///
    /// `media_size` may be `0` when the total size is not known up front
    /// (streaming write); the write engine patches `number_of_chunks` and
    /// `number_of_sectors` at finalize time in that case.
    pub fn new(
        media_size: u64,
        sectors_per_chunk: u32,
        bytes_per_sector: u32,
        format: Format,
    ) -> Self {
        let chunk_size = sectors_per_chunk * bytes_per_sector;
        let number_of_sectors = if bytes_per_sector == 0 {
            0
        } else {
            (media_size / bytes_per_sector as u64) as u32
        };
        let number_of_chunks = if chunk_size == 0 {
            0
        } else {
            number_of_sectors.div_ceil(sectors_per_chunk)
        };

        Self {
            media_size,
            chunk_size,
            sectors_per_chunk,
            bytes_per_sector,
            number_of_chunks,
            number_of_sectors,
            media_type: MediaType::Fixed,
            media_flags: media_flags::IMAGE,
            error_granularity: sectors_per_chunk,
            guid: uuid::Uuid::new_v4().into_bytes(),
            compression_level: 0,
            format,
        }
    }

    /// Offset, in bytes, of the first byte of `chunk_number` within the media.
    pub fn chunk_offset(&self, chunk_number: usize) -> u64 {
        chunk_number as u64 * self.chunk_size as u64
    }

    /// The size of `chunk_number`, accounting for a short final chunk.
    pub fn chunk_len(&self, chunk_number: usize) -> usize {
        let start = self.chunk_offset(chunk_number);
        let remaining = self.media_size.saturating_sub(start);
        remaining.min(self.chunk_size as u64) as usize
    }
}
