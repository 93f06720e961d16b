//! `next` / `done` section markers: header only, no payload (§3, §4.3).

use crate::format::Format;
use crate::section::{SectionHeader, SECTION_HEADER_SIZE};

/// Builds the header for a `next` section (this segment file continues elsewhere).
///
/// `next`'s `next_offset` points at its own start (it has nowhere further to
/// go within this file); its `size` is `sizeof(header)` for S01/FTK and left
/// at `0` for the EnCase family, per §4.3.
pub fn next(offset: u64, format: Format) -> SectionHeader {
    let size = if format.marker_size_is_header_size() {
        SECTION_HEADER_SIZE
    } else {
        0
    };
    SectionHeader::new("next", offset, size)
}

/// Builds the header for a `done` section (the image is complete).
pub fn done(offset: u64, format: Format) -> SectionHeader {
    let size = if format.marker_size_is_header_size() {
        SECTION_HEADER_SIZE
    } else {
        0
    };
    SectionHeader::new("done", offset, size)
}
