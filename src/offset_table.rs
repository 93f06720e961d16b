//! In-memory chunk index built from `table`/`table2` sections (§3, §4.4).

use crate::error::{Error, Result};
use crate::format::ErrorTolerance;
use crate::sections::table::RawTableEntry;

/// Where a chunk's bytes live: which segment file (by index into the handle's
/// `Vec<SegmentFile>`) and at what absolute offset.
#[derive(Debug, Clone, Copy)]
pub struct OffsetTableEntry {
    pub segment_index: usize,
    pub file_offset: u64,
    /// Payload size in bytes (compressed size if `compressed`).
    pub size: u32,
    pub compressed: bool,
    /// `true` once a delta-chunk write has re-pointed this entry (§4.7).
    pub in_delta: bool,
}

/// Dense, grow-only chunk index. Entry `i` is `None` until `fill` (or the
/// write engine) has placed it.
#[derive(Debug, Default)]
pub struct OffsetTable {
    entries: Vec<Option<OffsetTableEntry>>,
    pub last_filled: usize,
    pub last_compared: usize,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
            last_filled: 0,
            last_compared: 0,
        }
    }

    /// Grows the table to `new_capacity`, zero-filling (`None`) the tail.
    /// A no-op if `new_capacity` is not larger than the current length.
    pub fn resize(&mut self, new_capacity: usize) {
        if new_capacity > self.entries.len() {
            self.entries.resize(new_capacity, None);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies a freshly parsed `table` (or S01's solitary table) to this
    /// index, starting at `start_chunk`. Every entry's size is the distance to
    /// the next entry's absolute offset, except the last, whose size is the
    /// distance to `batch_end_offset` — the start of whatever section follows
    /// this table's chunk run (§4.3, "Last-chunk size").
    pub fn fill(
        &mut self,
        start_chunk: usize,
        base_offset: u64,
        raw_entries: &[RawTableEntry],
        segment_index: usize,
        batch_end_offset: u64,
    ) -> Result<()> {
        self.resize(start_chunk + raw_entries.len());
        let n = raw_entries.len();
        for (i, raw) in raw_entries.iter().enumerate() {
            let chunk_number = start_chunk + i;
            let absolute_offset = base_offset + raw.relative_offset as u64;
            let next_absolute_offset = if i + 1 < n {
                base_offset + raw_entries[i + 1].relative_offset as u64
            } else {
                batch_end_offset
            };
            if next_absolute_offset < absolute_offset {
                return Err(Error::Corrupt(format!(
                    "chunk {chunk_number} offset {absolute_offset} exceeds following boundary {next_absolute_offset}"
                )));
            }
            self.entries[chunk_number] = Some(OffsetTableEntry {
                segment_index,
                file_offset: absolute_offset,
                size: (next_absolute_offset - absolute_offset) as u32,
                compressed: raw.compressed,
                in_delta: false,
            });
        }
        self.last_filled = self.last_filled.max(start_chunk + n);
        Ok(())
    }

    /// Cross-checks a `table2` (or third-party secondary copy) against what
    /// `fill` already recorded, honoring `tolerance` on mismatch (§4.4, §9).
    pub fn compare(
        &mut self,
        start_chunk: usize,
        base_offset: u64,
        raw_entries: &[RawTableEntry],
        segment_index: usize,
        tolerance: ErrorTolerance,
    ) -> Result<()> {
        for (i, raw) in raw_entries.iter().enumerate() {
            let chunk_number = start_chunk + i;
            let secondary_offset = base_offset + raw.relative_offset as u64;
            match self.entries.get(chunk_number).and_then(|e| *e) {
                Some(primary) if primary.file_offset == secondary_offset && primary.compressed == raw.compressed => {
                    // agreement, nothing to do
                }
                Some(primary) => match tolerance {
                    ErrorTolerance::Strict => {
                        return Err(Error::Corrupt(format!(
                            "table/table2 disagree on chunk {chunk_number}"
                        )));
                    }
                    ErrorTolerance::Compensate => {
                        // keep the (tainted) primary entry untouched
                    }
                    ErrorTolerance::Correct => {
                        self.entries[chunk_number] = Some(OffsetTableEntry {
                            segment_index,
                            file_offset: secondary_offset,
                            size: primary.size,
                            compressed: raw.compressed,
                            in_delta: false,
                        });
                    }
                },
                None => {
                    return Err(Error::Corrupt(format!(
                        "table2 references chunk {chunk_number} with no primary table entry"
                    )));
                }
            }
        }
        self.last_compared = self.last_compared.max(start_chunk + raw_entries.len());
        Ok(())
    }

    /// Patches the final chunk's size once the containing segment file's
    /// section list reveals where the next section begins.
    pub fn fill_last_offset(&mut self, chunk_number: usize, next_section_start: u64) -> Result<()> {
        let entry = self
            .entries
            .get_mut(chunk_number)
            .and_then(|e| e.as_mut())
            .ok_or(Error::InvalidChunk(chunk_number))?;
        if next_section_start < entry.file_offset {
            return Err(Error::Corrupt(format!(
                "chunk {chunk_number} offset {} exceeds following section start {next_section_start}",
                entry.file_offset
            )));
        }
        entry.size = (next_section_start - entry.file_offset) as u32;
        Ok(())
    }

    pub fn lookup(&self, chunk_number: usize) -> Result<OffsetTableEntry> {
        self.entries
            .get(chunk_number)
            .and_then(|e| *e)
            .ok_or(Error::InvalidChunk(chunk_number))
    }

    pub fn seek_chunk(&self, chunk_number: usize) -> Result<(usize, u64)> {
        let e = self.lookup(chunk_number)?;
        Ok((e.segment_index, e.file_offset))
    }

    /// Used by the write engine to record a just-written chunk directly,
    /// bypassing the `table`-parsing path.
    pub fn set(&mut self, chunk_number: usize, entry: OffsetTableEntry) {
        if chunk_number >= self.entries.len() {
            self.resize(chunk_number + 1);
        }
        self.entries[chunk_number] = Some(entry);
        self.last_filled = self.last_filled.max(chunk_number + 1);
        self.last_compared = self.last_compared.max(chunk_number + 1);
    }

    /// Re-points an existing entry at a delta-chunk location (§4.7).
    pub fn redirect_to_delta(&mut self, chunk_number: usize, segment_index: usize, file_offset: u64, size: u32) -> Result<()> {
        let entry = self
            .entries
            .get_mut(chunk_number)
            .and_then(|e| e.as_mut())
            .ok_or(Error::InvalidChunk(chunk_number))?;
        entry.segment_index = segment_index;
        entry.file_offset = file_offset;
        entry.size = size;
        entry.compressed = false;
        entry.in_delta = true;
        Ok(())
    }

    pub fn truncate(&mut self, new_len: usize) {
        self.entries.truncate(new_len);
        self.last_filled = self.last_filled.min(new_len);
        self.last_compared = self.last_compared.min(new_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::table::RawTableEntry;

    fn raw(compressed: bool, offset: u32) -> RawTableEntry {
        RawTableEntry {
            compressed,
            relative_offset: offset,
        }
    }

    #[test]
    fn fill_and_lookup() {
        let mut t = OffsetTable::new();
        t.fill(0, 100, &[raw(true, 0), raw(false, 500)], 0, 1600).unwrap();
        let e0 = t.lookup(0).unwrap();
        assert_eq!(e0.file_offset, 100);
        assert_eq!(e0.size, 500);
        assert!(e0.compressed);
        let e1 = t.lookup(1).unwrap();
        assert_eq!(e1.file_offset, 600);
        assert_eq!(e1.size, 1000);
        assert!(!e1.compressed);
        assert_eq!(t.last_filled, 2);
    }

    #[test]
    fn missing_chunk_errors() {
        let t = OffsetTable::new();
        assert!(t.lookup(0).is_err());
    }

    #[test]
    fn compare_corrects_when_requested() {
        let mut t = OffsetTable::new();
        t.fill(0, 0, &[raw(true, 0)], 0, 1000).unwrap();
        // table2 disagrees: not compressed, same offset.
        t.compare(0, 0, &[raw(false, 0)], 0, ErrorTolerance::Correct).unwrap();
        assert!(!t.lookup(0).unwrap().compressed);
    }

    #[test]
    fn compare_strict_rejects_mismatch() {
        let mut t = OffsetTable::new();
        t.fill(0, 0, &[raw(true, 0)], 0, 1000).unwrap();
        assert!(t.compare(0, 0, &[raw(false, 0)], 0, ErrorTolerance::Strict).is_err());
    }

    #[test]
    fn fill_last_offset_patches_size() {
        let mut t = OffsetTable::new();
        t.fill(0, 100, &[raw(false, 0)], 0, 100).unwrap();
        t.fill_last_offset(0, 4096).unwrap();
        assert_eq!(t.lookup(0).unwrap().size, 3996);
    }

    #[test]
    fn redirect_to_delta_sets_flag() {
        let mut t = OffsetTable::new();
        t.fill(0, 0, &[raw(true, 0)], 0, 1000).unwrap();
        t.redirect_to_delta(0, 1, 50, 1004).unwrap();
        let e = t.lookup(0).unwrap();
        assert!(e.in_delta);
        assert_eq!(e.segment_index, 1);
        assert!(!e.compressed);
    }
}
