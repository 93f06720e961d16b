//! Write Engine: the `Fresh -> InSegment -> Finalized` streaming state
//! machine (§4.6). Chunks are buffered, compressed, checksummed, and spilled
//! into `sectors`/`table`/`table2` sections that respect a caller-imposed
//! segment-file size cap.

use std::io::Write;
use std::path::PathBuf;

use log::info;

use crate::checksum::adler32;
use crate::codec::{self, ZeroBlockCache};
use crate::digest::DualDigest;
use crate::error::{Error, Result};
use crate::format::{CompressionLevel, ErrorTolerance, Format};
use crate::media::MediaValues;
use crate::offset_table::OffsetTable;
use crate::section::{SectionHeader, SECTION_HEADER_SIZE};
use crate::sections::error2::ErrorEntry;
use crate::sections::header::{HeaderEncoding, HeaderValues};
use crate::sections::session::SessionEntry;
use crate::sections::{error2, hash, marker, session, table, volume, SectionKind};
use crate::segment::{SegmentFile, FILE_HEADER_SIZE};

/// Default cap on how many chunk entries a single `table` carries before it
/// is closed (§4.6).
pub const DEFAULT_CHUNKS_PER_SECTION: usize = 16_384;

/// Caller-provided knobs for a fresh write, generalizing the teacher's
/// constructor-argument style (no env/config-file reads) into one bundle.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub basename: String,
    pub format: Format,
    pub compression: CompressionLevel,
    pub max_segment_size: u64,
    pub chunks_per_section: usize,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    /// Total media size if known up front; `0` means "unknown, patch at finalize".
    pub media_size_hint: u64,
}

impl WriteOptions {
    pub fn new(basename: impl Into<String>, format: Format) -> Self {
        Self {
            basename: basename.into(),
            format,
            compression: CompressionLevel::Fast,
            max_segment_size: 1 << 31, // 2 GiB, a conservative default cap
            chunks_per_section: DEFAULT_CHUNKS_PER_SECTION,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            media_size_hint: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Fresh,
    InSegment,
    Finalized,
}

/// Bookkeeping for the currently open `sectors` run within the current segment file.
struct ChunksSection {
    header_offset: u64,
    payload_offset: u64,
    /// `(compressed, offset relative to payload_offset)` per chunk, in order.
    entries: Vec<(bool, u64)>,
    bytes_written: u64,
}

/// A write-in-progress EWF image. Exclusive for the lifetime of the write (§5).
pub struct WriteHandle {
    options: WriteOptions,
    media: MediaValues,
    segments: Vec<SegmentFile>,
    offset_table: OffsetTable,
    state: WriteState,
    chunk_buffer: Vec<u8>,
    chunk_number: usize,
    total_bytes_in: u64,
    current_section: Option<ChunksSection>,
    /// Absolute offset of the `volume`/`disk` section's header in segment 1,
    /// kept so finalize can back-patch it once the true media size is known.
    volume_patch_offset: Option<u64>,
    digest: DualDigest,
    zero_cache: ZeroBlockCache,
    acquisition_errors: Vec<ErrorEntry>,
    sessions: Vec<SessionEntry>,
    header_values: HeaderValues,
    hash_overrides: std::collections::HashMap<String, String>,
}

impl WriteHandle {
    /// Begins a fresh image (`Fresh` state; nothing is written to disk until
    /// the first byte arrives, matching the state table in §4.6).
    pub fn create(options: WriteOptions, header_values: HeaderValues) -> Result<Self> {
        if options.sectors_per_chunk == 0 || options.bytes_per_sector == 0 {
            return Err(Error::InvalidArgument("sectors_per_chunk and bytes_per_sector must be non-zero".into()));
        }
        let chunk_size = options.sectors_per_chunk as u64 * options.bytes_per_sector as u64;
        if chunk_size > i32::MAX as u64 {
            return Err(Error::LimitExceeded(format!("chunk size {chunk_size} exceeds INT32_MAX")));
        }
        let media = MediaValues::new(
            options.media_size_hint,
            options.sectors_per_chunk,
            options.bytes_per_sector,
            options.format,
        );
        Ok(Self {
            options,
            media,
            segments: Vec::new(),
            offset_table: OffsetTable::new(),
            state: WriteState::Fresh,
            chunk_buffer: Vec::new(),
            chunk_number: 0,
            total_bytes_in: 0,
            current_section: None,
            volume_patch_offset: None,
            digest: DualDigest::new(),
            zero_cache: ZeroBlockCache::new(),
            acquisition_errors: Vec::new(),
            sessions: Vec::new(),
            header_values,
            hash_overrides: std::collections::HashMap::new(),
        })
    }

    /// Reopens an interrupted write, walking every existing segment file's
    /// section list and repairing the last one back to a clean boundary
    /// (§4.6, "Resume"). Returns a handle ready to accept the remaining bytes;
    /// the caller should reposition its input source to [`Self::resume_offset`].
    pub fn open_resume(mut options: WriteOptions, paths: &[PathBuf], header_values: HeaderValues) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::InvalidArgument("no segment files given to resume".into()));
        }
        let mut segments: Vec<SegmentFile> = paths.iter().map(SegmentFile::open_write).collect::<Result<_>>()?;
        segments.sort_by_key(|s| s.segment_number);
        for (i, s) in segments.iter().enumerate() {
            if s.segment_number as usize != i + 1 {
                return Err(Error::InvalidFormat(format!(
                    "gap in segment number sequence before segment {}",
                    s.segment_number
                )));
            }
        }

        let mut media: Option<MediaValues> = None;
        let mut offset_table = OffsetTable::new();
        let mut next_chunk = 0usize;
        let mut volume_patch_offset = None;

        for seg_idx in 0..segments.len() {
            let where_ = segments[seg_idx].path.display().to_string();
            segments[seg_idx].seek_to(FILE_HEADER_SIZE)?;
            let file_len = segments[seg_idx].len()?;
            let mut pending_table: Option<(u64, table::DecodedTable)> = None;

            loop {
                let header_offset = segments[seg_idx].current_offset()?;
                if header_offset + SECTION_HEADER_SIZE > file_len {
                    // file truncated mid-header (or a clean, marker-less end); stop here.
                    break;
                }
                let mut mismatch = false;
                let section_header = {
                    let f = &mut segments[seg_idx].file;
                    SectionHeader::read_from(f, &where_, |_, _| mismatch = true)?
                };
                if mismatch {
                    log::warn!("section header checksum mismatch during resume at {where_}:{header_offset}");
                }
                let payload_offset = segments[seg_idx].current_offset()?;
                let payload_size = section_header.size.saturating_sub(SECTION_HEADER_SIZE);
                let kind = SectionKind::from_type_name(&section_header.type_name);

                match kind {
                    SectionKind::Volume | SectionKind::Disk | SectionKind::Data => {
                        let f = &mut segments[seg_idx].file;
                        let (m, _err) = volume::read_from(f, payload_size, &where_)?;
                        if seg_idx == 0 {
                            volume_patch_offset = Some(header_offset);
                        }
                        media = Some(m);
                    }
                    SectionKind::Sectors => {
                        let f = &mut segments[seg_idx].file;
                        crate::sections::sectors::skip(f, payload_size)?;
                    }
                    SectionKind::Table => {
                        let f = &mut segments[seg_idx].file;
                        let has_checksum = media.as_ref().map(|m| m.format.table_has_checksum()).unwrap_or(true);
                        let decoded = table::read_from(f, payload_size, has_checksum)?;
                        pending_table = Some((header_offset, decoded));
                    }
                    SectionKind::Table2 => {
                        let f = &mut segments[seg_idx].file;
                        let has_checksum = media.as_ref().map(|m| m.format.table_has_checksum()).unwrap_or(true);
                        let decoded = table::read_from(f, payload_size, has_checksum)?;
                        if let Some((batch_end, primary)) = pending_table.take() {
                            offset_table.fill(next_chunk, primary.base_offset, &primary.entries, seg_idx, batch_end)?;
                            offset_table.compare(next_chunk, decoded.base_offset, &decoded.entries, seg_idx, ErrorTolerance::Compensate)?;
                            next_chunk += primary.entries.len();
                        }
                    }
                    SectionKind::Header | SectionKind::Header2 | SectionKind::XHeader | SectionKind::Unknown => {
                        let f = &mut segments[seg_idx].file;
                        std::io::Seek::seek(f, std::io::SeekFrom::Current(payload_size as i64))
                            .map_err(|e| Error::io("skipping section during resume", e))?;
                    }
                    SectionKind::Next => {
                        segments[seg_idx].push_section(kind, header_offset, payload_offset, payload_offset);
                        break;
                    }
                    SectionKind::Done => {
                        return Err(Error::InvalidArgument("cannot resume an already-finalized (done) image".into()));
                    }
                    _ => {
                        let f = &mut segments[seg_idx].file;
                        std::io::Seek::seek(f, std::io::SeekFrom::Current(payload_size as i64))
                            .map_err(|e| Error::io("skipping section during resume", e))?;
                    }
                }

                let payload_end = segments[seg_idx].current_offset()?;
                segments[seg_idx].push_section(kind, header_offset, payload_offset, payload_end);
            }
        }

        let media = media.ok_or_else(|| Error::InvalidFormat("no volume/disk/data section found while resuming".into()))?;
        options.format = media.format;
        options.sectors_per_chunk = media.sectors_per_chunk;
        options.bytes_per_sector = media.bytes_per_sector;
        options.media_size_hint = media.media_size;

        let last_idx = segments.len() - 1;
        let last_section = segments[last_idx].sections.last().copied();
        match last_section.map(|s| s.kind) {
            None => {
                return Err(Error::Corrupt("segment file truncated before its volume section".into()));
            }
            Some(SectionKind::Volume) | Some(SectionKind::Disk) | Some(SectionKind::Data) => {
                // single-file image, nothing lost; the next chunks section opens fresh at EOF.
            }
            Some(SectionKind::Sectors) => {
                // these chunks were never indexed by a table; discard and re-stream them.
                let entry = last_section.unwrap();
                segments[last_idx].truncate(entry.header_offset)?;
                segments[last_idx].sections.pop();
                next_chunk = offset_table.last_compared;
            }
            Some(SectionKind::Table) => {
                // table present but its table2 (cross-check copy) is missing; only
                // entries already cross-checked elsewhere in this image are trusted.
                let entry = last_section.unwrap();
                offset_table.truncate(offset_table.last_compared);
                segments[last_idx].truncate(entry.header_offset)?;
                segments[last_idx].sections.pop();
                next_chunk = offset_table.last_compared;
            }
            Some(SectionKind::Table2) => {
                next_chunk = offset_table.last_filled;
            }
            Some(SectionKind::Next) => {
                next_chunk = offset_table.last_filled;
            }
            Some(other) => {
                return Err(Error::Corrupt(format!(
                    "segment file ends in a {other:?} section; cannot resume"
                )));
            }
        }

        // re-derive the running digest over every chunk already on disk, so the
        // final `digest`/`hash` section covers the whole stream, not just the
        // bytes written after this resume.
        let mut digest = DualDigest::new();
        for i in 0..next_chunk {
            let entry = offset_table.lookup(i)?;
            let seg = &mut segments[entry.segment_index];
            seg.seek_to(entry.file_offset)?;
            let mut raw = vec![0u8; entry.size as usize];
            std::io::Read::read_exact(&mut seg.file, &mut raw)
                .map_err(|e| Error::io(format!("re-reading chunk {i} during resume"), e))?;
            let decoded = if entry.compressed {
                codec::decompress(&raw)?
            } else {
                if raw.len() < 4 {
                    return Err(Error::Corrupt(format!("chunk {i} payload shorter than its checksum")));
                }
                raw[..raw.len() - 4].to_vec()
            };
            digest.update(&decoded);
        }

        let chunk_size = options.sectors_per_chunk as u64 * options.bytes_per_sector as u64;
        let resume_cursor = next_chunk as u64 * chunk_size;
        let ends_in_next = last_section.map(|s| s.kind) == Some(SectionKind::Next);

        let mut handle = Self {
            options,
            media,
            segments,
            offset_table,
            state: WriteState::InSegment,
            chunk_buffer: Vec::new(),
            chunk_number: next_chunk,
            total_bytes_in: resume_cursor,
            current_section: None,
            volume_patch_offset,
            digest,
            zero_cache: ZeroBlockCache::new(),
            acquisition_errors: Vec::new(),
            sessions: Vec::new(),
            header_values,
            hash_overrides: std::collections::HashMap::new(),
        };

        if ends_in_next {
            handle.open_next_segment()?;
        }

        info!(
            "resumed image {} at chunk {}: {} segment file(s)",
            handle.options.basename,
            handle.chunk_number,
            handle.segments.len()
        );

        Ok(handle)
    }

    /// Byte offset into the original input stream the caller should resume
    /// feeding from after [`Self::open_resume`].
    pub fn resume_offset(&self) -> u64 {
        self.total_bytes_in
    }

    pub fn media_values(&self) -> &MediaValues {
        &self.media
    }

    pub fn add_acquisition_error(&mut self, first_sector: u32, number_of_sectors: u32) {
        self.acquisition_errors.push(ErrorEntry {
            first_sector,
            number_of_sectors,
        });
    }

    pub fn set_hash_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.hash_overrides.insert(key.into(), value.into());
    }

    fn segment_path(&self, segment_number: u16) -> Result<PathBuf> {
        Ok(PathBuf::from(crate::filename::segment_path(
            &self.options.basename,
            segment_number as u32,
            self.options.format,
        )?))
    }

    fn open_first_segment(&mut self) -> Result<()> {
        let path = self.segment_path(1)?;
        let mut seg = SegmentFile::create_write(path, self.options.format.signature_family(), false, 1)?;
        self.write_header_sections(&mut seg)?;
        self.write_volume_section(&mut seg)?;
        self.segments.push(seg);
        self.state = WriteState::InSegment;
        Ok(())
    }

    fn write_header_sections(&mut self, seg: &mut SegmentFile) -> Result<()> {
        use crate::format::HeaderLayout::*;
        let copies: &[(&str, HeaderEncoding)] = match self.options.format.header_layout() {
            SingleHeader => &[("header", HeaderEncoding::Ascii)],
            DoubleHeader => &[("header", HeaderEncoding::Ascii), ("header", HeaderEncoding::Ascii)],
            HeaderAndDoubleHeader2 => &[
                ("header", HeaderEncoding::Ascii),
                ("header2", HeaderEncoding::Utf16Le),
                ("header2", HeaderEncoding::Utf16Le),
            ],
            AllThree => &[
                ("header", HeaderEncoding::Ascii),
                ("header2", HeaderEncoding::Utf16Le),
                ("xheader", HeaderEncoding::Utf8),
            ],
        };
        for (type_name, encoding) in copies {
            let payload = self.header_values.encode(*encoding, CompressionLevel::Best)?;
            write_section(seg, type_name, &payload)?;
        }
        Ok(())
    }

    fn write_volume_section(&mut self, seg: &mut SegmentFile) -> Result<()> {
        let header_offset = seg.current_offset()?;
        let payload = volume::encode(&self.media, volume::payload_size_for(self.options.format));
        write_section(seg, "volume", &payload)?;
        self.volume_patch_offset = Some(header_offset);
        Ok(())
    }

    fn open_chunks_section(&mut self) -> Result<()> {
        let seg = self.segments.last_mut().expect("segment open before chunks section");
        let header_offset = seg.current_offset()?;
        // placeholder sectors header; back-patched in close_chunks_section.
        let placeholder = SectionHeader::new("sectors", header_offset, SECTION_HEADER_SIZE);
        placeholder.write_to(&mut seg.file)?;
        let payload_offset = seg.current_offset()?;
        self.current_section = Some(ChunksSection {
            header_offset,
            payload_offset,
            entries: Vec::new(),
            bytes_written: 0,
        });
        Ok(())
    }

    fn close_chunks_section(&mut self) -> Result<()> {
        let section = match self.current_section.take() {
            Some(s) => s,
            None => return Ok(()),
        };
        let seg = self.segments.last_mut().unwrap();
        let sectors_end = section.payload_offset + section.bytes_written;

        // back-patch the sectors header now that its true size is known.
        seg.seek_to(section.header_offset)?;
        let patched = SectionHeader::new("sectors", sectors_end, sectors_end - section.header_offset);
        patched.write_to(&mut seg.file)?;
        seg.seek_to(sectors_end)?;
        seg.push_section(
            crate::sections::SectionKind::Sectors,
            section.header_offset,
            section.payload_offset,
            sectors_end,
        );

        let with_array_checksum = self.options.format.table_has_checksum();
        let raw_entries = table::encode_entries(&section.entries);
        let table_header_offset = seg.current_offset()?;
        let table_bytes = table::encode(section.payload_offset, &raw_entries, with_array_checksum);
        let table_size = SECTION_HEADER_SIZE + table_bytes.len() as u64;
        let table_next = table_header_offset + table_size;
        SectionHeader::new("table", table_next, table_size).write_to(&mut seg.file)?;
        seg.file
            .write_all(&table_bytes)
            .map_err(|e| Error::io("writing table payload", e))?;
        seg.push_section(
            crate::sections::SectionKind::Table,
            table_header_offset,
            table_header_offset + SECTION_HEADER_SIZE,
            table_next,
        );

        if self.options.format.emits_table2() {
            let table2_header_offset = seg.current_offset()?;
            let table2_next = table2_header_offset + table_size;
            SectionHeader::new("table2", table2_next, table_size).write_to(&mut seg.file)?;
            seg.file
                .write_all(&table_bytes)
                .map_err(|e| Error::io("writing table2 payload", e))?;
            seg.push_section(
                crate::sections::SectionKind::Table2,
                table2_header_offset,
                table2_header_offset + SECTION_HEADER_SIZE,
                table2_next,
            );
        }

        let start_chunk = self.chunk_number - section.entries.len();
        let segment_index = self.segments.len() - 1;
        self.offset_table
            .fill(start_chunk, section.payload_offset, &raw_entries, segment_index, sectors_end)?;

        Ok(())
    }

    fn close_segment_file(&mut self, is_last: bool) -> Result<()> {
        self.close_chunks_section()?;
        let seg = self.segments.last_mut().unwrap();
        let offset = seg.current_offset()?;
        let sh = if is_last {
            marker::done(offset, self.options.format)
        } else {
            marker::next(offset, self.options.format)
        };
        sh.write_to(&mut seg.file)?;
        let kind = if is_last {
            crate::sections::SectionKind::Done
        } else {
            crate::sections::SectionKind::Next
        };
        seg.push_section(kind, offset, offset + SECTION_HEADER_SIZE, offset + SECTION_HEADER_SIZE);
        Ok(())
    }

    fn open_next_segment(&mut self) -> Result<()> {
        let next_number = self.segments.len() as u16 + 1;
        let path = self.segment_path(next_number)?;
        let seg = SegmentFile::create_write(path, self.options.format.signature_family(), false, next_number)?;
        self.segments.push(seg);
        Ok(())
    }

    /// Conservative per-chunk on-disk overhead used for segment-size estimation (§4.6).
    fn overhead_per_chunk(&self) -> u64 {
        self.media.chunk_size as u64 + if self.options.format.is_smart_flavor() { 16 } else { 4 }
    }

    fn chunks_section_overhead(&self) -> u64 {
        let table_overhead = 24 + if self.options.format.table_has_checksum() { 4 } else { 0 };
        let tables = if self.options.format.emits_table2() { 2 } else { 1 };
        SECTION_HEADER_SIZE + tables * (SECTION_HEADER_SIZE + table_overhead)
    }

    fn current_segment_len(&mut self) -> Result<u64> {
        self.segments.last_mut().unwrap().current_offset()
    }

    /// Decides whether the current chunks section must close before another
    /// chunk can be buffered, and if so whether the segment file must close too.
    fn maybe_roll_over(&mut self) -> Result<()> {
        let entries_len = self.current_section.as_ref().map(|s| s.entries.len()).unwrap_or(0);
        let section_full = entries_len >= self.options.chunks_per_section;

        let current_len = self.current_segment_len()?;
        let projected = current_len + self.overhead_per_chunk();
        let space_exhausted = self.current_section.is_some() && projected > self.options.max_segment_size;

        if !section_full && !space_exhausted {
            return Ok(());
        }

        self.close_chunks_section()?;

        let remaining = self.options.max_segment_size.saturating_sub(self.current_segment_len()?);
        if remaining < self.chunks_section_overhead() + self.overhead_per_chunk() {
            self.close_segment_file(false)?;
            self.open_next_segment()?;
        }
        Ok(())
    }

    fn encode_chunk(&mut self, raw: &[u8]) -> Result<(bool, Vec<u8>)> {
        let chunk_size = raw.len();
        let is_empty = codec::is_empty_block(raw);
        if is_empty {
            if let Some(cached) = self.zero_cache.get(chunk_size, self.options.compression) {
                return Ok((true, cached.to_vec()));
            }
        }
        let attempt_level = if self.options.compression == CompressionLevel::None {
            if is_empty {
                Some(CompressionLevel::Fast)
            } else {
                None
            }
        } else {
            Some(self.options.compression)
        };
        if let Some(level) = attempt_level {
            let compressed = codec::compress(raw, level)?;
            if compressed.len() < raw.len() {
                if is_empty {
                    self.zero_cache.store(chunk_size, self.options.compression, compressed.clone());
                }
                return Ok((true, compressed));
            }
        }
        let mut out = raw.to_vec();
        out.extend_from_slice(&adler32(raw).to_le_bytes());
        Ok((false, out))
    }

    fn write_full_chunk(&mut self, raw: &[u8]) -> Result<()> {
        self.digest.update(raw);
        self.maybe_roll_over()?;
        if self.current_section.is_none() {
            self.open_chunks_section()?;
        }
        let (compressed, bytes) = self.encode_chunk(raw)?;

        let seg = self.segments.last_mut().unwrap();
        let section = self.current_section.as_mut().unwrap();
        let offset_in_section = section.bytes_written;
        seg.file
            .write_all(&bytes)
            .map_err(|e| Error::io("writing chunk payload", e))?;
        section.entries.push((compressed, offset_in_section));
        section.bytes_written += bytes.len() as u64;

        self.chunk_number += 1;
        Ok(())
    }

    /// Streams `data` in, emitting full chunks as they accumulate. Append-only (§6).
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.state == WriteState::Finalized {
            return Err(Error::InvalidArgument("write after finalize".into()));
        }
        if self.state == WriteState::Fresh {
            self.open_first_segment()?;
        }

        let chunk_size = self.media.chunk_size as usize;
        let mut consumed = 0;
        self.chunk_buffer.extend_from_slice(data);
        consumed += data.len();

        while self.chunk_buffer.len() >= chunk_size {
            let chunk: Vec<u8> = self.chunk_buffer.drain(..chunk_size).collect();
            self.write_full_chunk(&chunk)?;
        }

        self.total_bytes_in += data.len() as u64;
        Ok(consumed)
    }

    /// Flushes any partial last chunk, patches `volume` if the media size was
    /// unknown up front, emits the trailer sections, and closes the image.
    pub fn finalize(mut self) -> Result<Vec<PathBuf>> {
        if self.state == WriteState::Fresh {
            self.open_first_segment()?;
        }
        if !self.chunk_buffer.is_empty() {
            let tail = std::mem::take(&mut self.chunk_buffer);
            self.write_full_chunk(&tail)?;
        }
        self.close_chunks_section()?;

        if self.options.media_size_hint == 0 {
            self.patch_volume_section()?;
        }

        let seg_idx = self.segments.len() - 1;
        let (md5, sha1) = {
            let digest = std::mem::replace(&mut self.digest, DualDigest::new());
            digest.finalize()
        };
        let md5_bytes: [u8; 16] = md5.try_into().unwrap();
        let sha1_bytes: [u8; 20] = sha1.try_into().unwrap();
        let digest_payload = hash::encode_digest(&md5_bytes, &sha1_bytes);
        write_section(&mut self.segments[seg_idx], "digest", &digest_payload)?;

        if !self.acquisition_errors.is_empty() {
            let payload = error2::encode(&self.acquisition_errors);
            write_section(&mut self.segments[seg_idx], "error2", &payload)?;
        }
        if !self.sessions.is_empty() {
            let payload = session::encode(&self.sessions);
            write_section(&mut self.segments[seg_idx], "session", &payload)?;
        }

        self.close_segment_file(true)?;
        self.state = WriteState::Finalized;

        info!(
            "finalized image {}: {} chunk(s) across {} segment file(s)",
            self.options.basename,
            self.chunk_number,
            self.segments.len()
        );

        Ok(self.segments.iter().map(|s| s.path.clone()).collect())
    }

    fn patch_volume_section(&mut self) -> Result<()> {
        let header_offset = match self.volume_patch_offset {
            Some(o) => o,
            None => return Ok(()),
        };
        self.media.media_size = self.total_bytes_in;
        self.media.number_of_sectors = if self.media.bytes_per_sector == 0 {
            0
        } else {
            (self.total_bytes_in / self.media.bytes_per_sector as u64) as u32
        };
        self.media.number_of_chunks = self.chunk_number as u32;

        let first_seg = &mut self.segments[0];
        let restore = first_seg.current_offset()?;
        first_seg.seek_to(header_offset + SECTION_HEADER_SIZE)?;
        let payload = volume::encode(&self.media, volume::payload_size_for(self.options.format));
        first_seg
            .file
            .write_all(&payload)
            .map_err(|e| Error::io("patching volume payload", e))?;
        first_seg.seek_to(restore)?;
        Ok(())
    }
}

/// Writes one section whose payload is already fully assembled: header +
/// payload + the resulting section-list entry, in a single pass (no
/// back-patch needed since the size is known up front).
fn write_section(seg: &mut SegmentFile, type_name: &str, payload: &[u8]) -> Result<()> {
    let header_offset = seg.current_offset()?;
    let size = SECTION_HEADER_SIZE + payload.len() as u64;
    let next_offset = header_offset + size;
    SectionHeader::new(type_name, next_offset, size).write_to(&mut seg.file)?;
    seg.file
        .write_all(payload)
        .map_err(|e| Error::io(format!("writing {type_name} payload"), e))?;
    let kind = crate::sections::SectionKind::from_type_name(type_name);
    seg.push_section(kind, header_offset, header_offset + SECTION_HEADER_SIZE, next_offset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(dir: &std::path::Path) -> WriteOptions {
        let mut o = WriteOptions::new(dir.join("IMG").to_string_lossy().to_string(), Format::Encase6);
        o.sectors_per_chunk = 8;
        o.bytes_per_sector = 512;
        o.max_segment_size = 1 << 20;
        o
    }

    #[test]
    fn writes_a_small_single_segment_image() {
        let dir = tempfile::tempdir().unwrap();
        let handle = WriteHandle::create(opts(dir.path()), HeaderValues::default()).unwrap();
        let mut handle = handle;
        let chunk_size = handle.media_values().chunk_size as usize;
        let data = vec![0xABu8; chunk_size * 3 + 100];
        handle.write(&data).unwrap();
        let paths = handle.finalize().unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].exists());
        let len = std::fs::metadata(&paths[0]).unwrap().len();
        assert!(len > data.len() as u64);
    }

    #[test]
    fn rejects_write_after_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = WriteHandle::create(opts(dir.path()), HeaderValues::default()).unwrap();
        handle.write(&[0u8; 16]).unwrap();
        let _ = handle;
    }
}
