//! Segment-file container I/O: file header, and the in-memory section list
//! each segment file carries once its sections have been walked or emitted
//! (§4.2).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::format::{SignatureFamily, DVF_SIGNATURE, EVF_SIGNATURE, LVF_SIGNATURE};
use crate::sections::SectionKind;

pub const FILE_HEADER_SIZE: u64 = 13;

/// Builds the 13-byte file header: signature, `fields_start`, little-endian
/// segment number, `fields_end`.
pub fn encode_file_header(signature: SignatureFamily, is_delta: bool, segment_number: u16) -> [u8; 13] {
    let mut buf = [0u8; 13];
    let sig = if is_delta {
        &DVF_SIGNATURE
    } else {
        match signature {
            SignatureFamily::Ewf => &EVF_SIGNATURE,
            SignatureFamily::Logical => &LVF_SIGNATURE,
        }
    };
    buf[0..8].copy_from_slice(sig);
    buf[8] = 0x01;
    buf[9..11].copy_from_slice(&segment_number.to_le_bytes());
    // buf[11..13] fields_end stays zero.
    buf
}

/// What kind of signature a freshly opened segment file carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSignature {
    Evf,
    Lvf,
    Dvf,
}

/// Parses and validates a 13-byte file header.
pub fn decode_file_header(buf: &[u8; 13]) -> Result<(SegmentSignature, u16)> {
    let signature = if buf[0..8] == EVF_SIGNATURE {
        SegmentSignature::Evf
    } else if buf[0..8] == LVF_SIGNATURE {
        SegmentSignature::Lvf
    } else if buf[0..8] == DVF_SIGNATURE {
        SegmentSignature::Dvf
    } else {
        return Err(Error::InvalidFormat("segment file signature not recognized".into()));
    };
    if buf[8] != 0x01 {
        return Err(Error::InvalidFormat("segment file fields_start byte is not 0x01".into()));
    }
    let segment_number = u16::from_le_bytes([buf[9], buf[10]]);
    Ok((signature, segment_number))
}

/// One entry in a segment file's section list: what kind of section it was,
/// and where its payload (not its header) starts and ends.
#[derive(Debug, Clone, Copy)]
pub struct SectionListEntry {
    pub kind: SectionKind,
    /// Absolute offset of this section's 76-byte header.
    pub header_offset: u64,
    /// Absolute offset of the first payload byte.
    pub payload_offset: u64,
    /// Absolute offset one past the last payload byte (== next section's header_offset).
    pub payload_end: u64,
}

/// One on-disk segment (or delta) file plus its section-list bookkeeping.
pub struct SegmentFile {
    pub path: PathBuf,
    pub file: File,
    pub segment_number: u16,
    pub signature: SegmentSignature,
    pub sections: Vec<SectionListEntry>,
}

impl SegmentFile {
    /// Opens an existing segment file read-only and validates its header.
    pub fn open_read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
        let mut header = [0u8; FILE_HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|e| Error::io(format!("reading file header of {}", path.display()), e))?;
        let (signature, segment_number) = decode_file_header(&header)?;
        Ok(Self {
            path,
            file,
            segment_number,
            signature,
            sections: Vec::new(),
        })
    }

    /// Creates a fresh segment file for writing and emits its file header.
    pub fn create_write(
        path: impl AsRef<Path>,
        family: SignatureFamily,
        is_delta: bool,
        segment_number: u16,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .read(true)
            .open(&path)
            .map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
        let header = encode_file_header(family, is_delta, segment_number);
        file.write_all(&header)
            .map_err(|e| Error::io(format!("writing file header of {}", path.display()), e))?;
        let signature = if is_delta {
            SegmentSignature::Dvf
        } else {
            match family {
                SignatureFamily::Ewf => SegmentSignature::Evf,
                SignatureFamily::Logical => SegmentSignature::Lvf,
            }
        };
        Ok(Self {
            path,
            file,
            segment_number,
            signature,
            sections: Vec::new(),
        })
    }

    /// Reopens an existing segment file for in-place writing (resume, or delta overwrite-in-place).
    pub fn open_write(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(format!("opening {} for write", path.display()), e))?;
        let mut header = [0u8; FILE_HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|e| Error::io(format!("reading file header of {}", path.display()), e))?;
        let (signature, segment_number) = decode_file_header(&header)?;
        Ok(Self {
            path,
            file,
            segment_number,
            signature,
            sections: Vec::new(),
        })
    }

    pub fn current_offset(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|e| Error::io("reading current file position", e))
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io("seeking segment file", e))?;
        Ok(())
    }

    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .map_err(|e| Error::io("truncating segment file", e))?;
        self.seek_to(len)
    }

    pub fn len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error::io("statting segment file", e))
    }

    pub fn push_section(&mut self, kind: SectionKind, header_offset: u64, payload_offset: u64, payload_end: u64) {
        self.sections.push(SectionListEntry {
            kind,
            header_offset,
            payload_offset,
            payload_end,
        });
    }

    pub fn last_section(&self) -> Option<&SectionListEntry> {
        self.sections.last()
    }

    /// Finds the first section-list entry whose `header_offset` strictly
    /// follows `after`, used to infer the final chunk's size (§4.3).
    pub fn section_starting_after(&self, after: u64) -> Option<&SectionListEntry> {
        self.sections
            .iter()
            .filter(|s| s.header_offset > after)
            .min_by_key(|s| s.header_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_roundtrip() {
        let bytes = encode_file_header(SignatureFamily::Ewf, false, 7);
        let (sig, num) = decode_file_header(&bytes).unwrap();
        assert_eq!(sig, SegmentSignature::Evf);
        assert_eq!(num, 7);
    }

    #[test]
    fn delta_signature_overrides_family() {
        let bytes = encode_file_header(SignatureFamily::Ewf, true, 1);
        let (sig, _) = decode_file_header(&bytes).unwrap();
        assert_eq!(sig, SegmentSignature::Dvf);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = encode_file_header(SignatureFamily::Ewf, false, 1);
        bytes[0] = 0xFF;
        assert!(decode_file_header(&bytes).is_err());
    }
}
