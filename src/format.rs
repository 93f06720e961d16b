//! The `Format` enum and its per-flavor decision table.
//!
//! The original C sources track this with two independent enums
//! (`format` and `ewf_format`) and scatter `if (format == X && ewf_format == Y)`
//! cascades through the section writers. Here a single enum carries every
//! per-flavor fact as a method, so callers never re-derive the table.

use crate::error::{Error, Result};

/// Which header-section family a format emits, and in what compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// A single ASCII `header`, compressed at the image's chosen level.
    SingleHeader,
    /// Two copies of an ASCII `header`, always at default compression.
    DoubleHeader,
    /// One `header` plus two copies of a UTF-16LE `header2`.
    HeaderAndDoubleHeader2,
    /// One of each: `header`, `header2`, `xheader`.
    AllThree,
}

/// One of the EWF-family format flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Smart,
    Ewf,
    Encase1,
    Encase2,
    Encase3,
    Encase4,
    Encase5,
    Encase6,
    Linen5,
    Linen6,
    Ftk,
    Ewfx,
    /// Logical evidence file (`.L01`); carries an `ltree` section.
    Lvf,
}

impl Format {
    /// The container's signature family: which 8-byte file signature is emitted.
    pub fn signature_family(self) -> SignatureFamily {
        match self {
            Format::Lvf => SignatureFamily::Logical,
            _ => SignatureFamily::Ewf,
        }
    }

    /// First/additional characters used to build the filename extension (§6).
    pub fn extension_chars(self) -> (u8, u8) {
        match self {
            Format::Ewf | Format::Ewfx => (b'e', b'a'),
            Format::Smart => (b's', b'a'),
            Format::Lvf => (b'L', b'A'),
            _ => (b'E', b'A'),
        }
    }

    /// Whether chunk offsets are written as `volume`(S01) or go through `data`/`disk` too.
    pub fn is_smart_flavor(self) -> bool {
        matches!(self, Format::Smart)
    }

    /// Which header sections get emitted and how many copies.
    pub fn header_layout(self) -> HeaderLayout {
        match self {
            Format::Ewf | Format::Smart | Format::Encase1 => HeaderLayout::SingleHeader,
            Format::Encase2 | Format::Encase3 | Format::Linen5 | Format::Linen6 | Format::Ftk => {
                HeaderLayout::DoubleHeader
            }
            Format::Encase4 | Format::Encase5 | Format::Encase6 => {
                HeaderLayout::HeaderAndDoubleHeader2
            }
            Format::Ewfx => HeaderLayout::AllThree,
            Format::Lvf => HeaderLayout::HeaderAndDoubleHeader2,
        }
    }

    /// Whether the writer emits a `table2` in addition to `table`.
    pub fn emits_table2(self) -> bool {
        !matches!(self, Format::Smart | Format::Encase1)
    }

    /// Whether chunk offset entries carry a post-array checksum in `table`.
    pub fn table_has_checksum(self) -> bool {
        !matches!(self, Format::Smart)
    }

    /// Whether a `done`/`next` section's `size` field is `sizeof(header)` (S01/FTK)
    /// or left at `0` (EnCase family, deliberately per spec).
    pub fn marker_size_is_header_size(self) -> bool {
        matches!(self, Format::Smart | Format::Ftk)
    }

    /// Human-readable tag stored in `MediaValues::format` and shown by CLI `info`.
    pub fn tag(self) -> &'static str {
        match self {
            Format::Smart => "SMART",
            Format::Ewf => "EWF",
            Format::Encase1 => "ENCASE1",
            Format::Encase2 => "ENCASE2",
            Format::Encase3 => "ENCASE3",
            Format::Encase4 => "ENCASE4",
            Format::Encase5 => "ENCASE5",
            Format::Encase6 => "ENCASE6",
            Format::Linen5 => "LINEN5",
            Format::Linen6 => "LINEN6",
            Format::Ftk => "FTK",
            Format::Ewfx => "EWFX",
            Format::Lvf => "LVF",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        Ok(match tag {
            "SMART" => Format::Smart,
            "EWF" => Format::Ewf,
            "ENCASE1" => Format::Encase1,
            "ENCASE2" => Format::Encase2,
            "ENCASE3" => Format::Encase3,
            "ENCASE4" => Format::Encase4,
            "ENCASE5" => Format::Encase5,
            "ENCASE6" => Format::Encase6,
            "LINEN5" => Format::Linen5,
            "LINEN6" => Format::Linen6,
            "FTK" => Format::Ftk,
            "EWFX" => Format::Ewfx,
            "LVF" => Format::Lvf,
            other => return Err(Error::InvalidFormat(format!("unknown format tag {other}"))),
        })
    }
}

/// Which 8-byte file signature a segment file of this family carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFamily {
    Ewf,
    Logical,
}

/// File signatures, first 8 bytes of every segment file (§6).
pub const EVF_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
pub const LVF_SIGNATURE: [u8; 8] = [0x4C, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
pub const DVF_SIGNATURE: [u8; 8] = [0x64, 0x76, 0x66, 0x09, 0x0D, 0x0A, 0xFF, 0x00];

/// Compression level requested by the caller for new chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    None,
    Fast,
    Best,
}

impl CompressionLevel {
    pub fn to_flate2(self) -> flate2::Compression {
        match self {
            CompressionLevel::None => flate2::Compression::none(),
            CompressionLevel::Fast => flate2::Compression::fast(),
            CompressionLevel::Best => flate2::Compression::best(),
        }
    }
}

/// Controls what happens when a `table` and its `table2` disagree (§9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTolerance {
    /// Fail outright on any mismatch.
    Strict,
    /// Accept the tainted entries, do not attempt to correct them.
    Compensate,
    /// Rewrite the primary entry from the secondary copy when it verifies.
    Correct,
}
