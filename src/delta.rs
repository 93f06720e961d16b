//! Delta-Chunk Overlay: write-through edits to an existing image via a
//! parallel `.Dxx` segment chain (§4.7). Opening a base image for delta adds
//! its own segment files to the base [`ReadHandle`]'s segment list, so an
//! offset-table entry redirected here points at a real, readable file like
//! any other.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::checksum::adler32;
use crate::error::{Error, Result};
use crate::filename::delta_extension;
use crate::format::SignatureFamily;
use crate::read::ReadHandle;
use crate::section::{SectionHeader, SECTION_HEADER_SIZE};
use crate::sections::delta_chunk::{self, DeltaChunkHeader, DELTA_CHUNK_HEADER_SIZE};
use crate::sections::SectionKind;
use crate::segment::{SegmentFile, SegmentSignature, FILE_HEADER_SIZE};

/// How many `delta_chunk` sections one `.Dxx` file accumulates before a new
/// one is opened. Not part of the on-disk format; keeps delta files bounded
/// the way segment files are bounded by `chunks_per_section`.
pub const DEFAULT_CHUNKS_PER_DELTA_FILE: usize = 16_384;

/// An open edit session against an existing image (§4.7).
pub struct DeltaHandle {
    base: ReadHandle,
    delta_basename: String,
    chunks_per_file: usize,
    next_delta_number: u16,
    delta_paths: Vec<PathBuf>,
    /// Index into `base.segments_mut()` of the currently open, appendable
    /// `.Dxx` file, or `None` if the last-known one was finalized with `next`
    /// (or no delta file has been opened yet).
    active_index: Option<usize>,
    /// Offset of the trailing `done` section in the active file, rewound and
    /// overwritten the next time that file is extended.
    active_done_offset: Option<u64>,
    /// `chunk_number -> payload_offset` for `delta_chunk` sections already
    /// present in the active file, supporting in-place overwrite (§4.7.3).
    active_chunks: HashMap<usize, u64>,
}

impl DeltaHandle {
    /// Opens a delta session against `base`. `paths` are any previously
    /// written `.Dxx` files for this session (empty for a brand-new overlay).
    pub fn open(base: ReadHandle, paths: &[PathBuf], delta_basename: impl Into<String>) -> Result<Self> {
        let mut handle = Self {
            base,
            delta_basename: delta_basename.into(),
            chunks_per_file: DEFAULT_CHUNKS_PER_DELTA_FILE,
            next_delta_number: 1,
            delta_paths: Vec::new(),
            active_index: None,
            active_done_offset: None,
            active_chunks: HashMap::new(),
        };
        if !paths.is_empty() {
            handle.load_existing_chain(paths)?;
        }
        Ok(handle)
    }

    fn load_existing_chain(&mut self, paths: &[PathBuf]) -> Result<()> {
        let mut files: Vec<SegmentFile> = paths.iter().map(SegmentFile::open_read).collect::<Result<_>>()?;
        files.sort_by_key(|f| f.segment_number);

        for (i, f) in files.iter().enumerate() {
            if f.signature != SegmentSignature::Dvf {
                return Err(Error::InvalidFormat(format!(
                    "{} is not a delta (.Dxx) file",
                    f.path.display()
                )));
            }
            if f.segment_number as usize != i + 1 {
                return Err(Error::InvalidFormat(format!(
                    "gap in delta segment number sequence before segment {}",
                    f.segment_number
                )));
            }
        }

        let base_start = self.base.segments_mut().len();
        let total = files.len();
        self.next_delta_number = total as u16 + 1;
        for f in files {
            self.delta_paths.push(f.path.clone());
            self.base.segments_mut().push(f);
        }

        for i in 0..total {
            let seg_index = base_start + i;
            let is_last = i + 1 == total;
            let (chunks, done_offset, ended_with_next) = self.walk_delta_file(seg_index)?;
            if is_last {
                if ended_with_next {
                    // chain was fully closed out; the next write opens a fresh file.
                    self.active_index = None;
                    self.active_done_offset = None;
                    self.active_chunks = HashMap::new();
                } else {
                    self.active_index = Some(seg_index);
                    self.active_done_offset = done_offset;
                    self.active_chunks = chunks;
                }
            }
        }

        if let Some(idx) = self.active_index {
            let path = self.base.segments_mut()[idx].path.clone();
            self.base.segments_mut()[idx] = SegmentFile::open_write(path)?;
        }

        Ok(())
    }

    /// Walks one already-registered `.Dxx` segment file, redirecting every
    /// `delta_chunk` it contains and reporting the bookkeeping needed if it
    /// turns out to be the active (last) file.
    fn walk_delta_file(&mut self, seg_index: usize) -> Result<(HashMap<usize, u64>, Option<u64>, bool)> {
        let where_ = self.base.segments_mut()[seg_index].path.display().to_string();
        self.base.segments_mut()[seg_index].seek_to(FILE_HEADER_SIZE)?;

        let mut chunks = HashMap::new();
        let mut done_offset = None;
        let mut ended_with_next = false;

        loop {
            let header_offset = self.base.segments_mut()[seg_index].current_offset()?;
            let mut mismatch = false;
            let section_header = {
                let f = &mut self.base.segments_mut()[seg_index].file;
                SectionHeader::read_from(f, &where_, |_, _| mismatch = true)?
            };
            if mismatch {
                log::warn!("section header checksum mismatch at {where_}:{header_offset}");
            }
            let payload_offset = self.base.segments_mut()[seg_index].current_offset()?;
            let kind = SectionKind::from_type_name(&section_header.type_name);

            match kind {
                SectionKind::DeltaChunk => {
                    let (dch, header_ok) = {
                        let f = &mut self.base.segments_mut()[seg_index].file;
                        DeltaChunkHeader::read_from(f)?
                    };
                    if !header_ok {
                        return Err(Error::Corrupt(format!(
                            "delta_chunk header checksum mismatch at {where_}:{header_offset}"
                        )));
                    }
                    let chunk_number = (dch.chunk_number_one_based - 1) as usize;
                    let data_offset = self.base.segments_mut()[seg_index].current_offset()?;
                    self.base.segments_mut()[seg_index].seek_to(data_offset + dch.chunk_size as u64 + 4)?;
                    chunks.insert(chunk_number, data_offset);
                    self.base
                        .offset_table_mut()
                        .redirect_to_delta(chunk_number, seg_index, data_offset, dch.chunk_size + 4)?;
                    self.base.invalidate_cache(chunk_number);
                    let payload_end = self.base.segments_mut()[seg_index].current_offset()?;
                    self.base.segments_mut()[seg_index].push_section(kind, header_offset, payload_offset, payload_end);
                }
                SectionKind::Next => {
                    self.base.segments_mut()[seg_index].push_section(kind, header_offset, payload_offset, payload_offset);
                    ended_with_next = true;
                    break;
                }
                SectionKind::Done => {
                    self.base.segments_mut()[seg_index].push_section(kind, header_offset, payload_offset, payload_offset);
                    done_offset = Some(header_offset);
                    break;
                }
                other => {
                    return Err(Error::InvalidFormat(format!(
                        "unexpected {:?} section in delta file {where_}",
                        other
                    )));
                }
            }
        }

        Ok((chunks, done_offset, ended_with_next))
    }

    /// Writes (or overwrites) one full chunk's worth of replacement bytes.
    pub fn write_chunk(&mut self, chunk_number: usize, bytes: &[u8]) -> Result<()> {
        self.base.offset_table_mut().lookup(chunk_number)?;
        let chunk_size = self.base.media_values().chunk_size as usize;
        if bytes.len() != chunk_size {
            return Err(Error::InvalidArgument(format!(
                "delta chunk must be exactly {chunk_size} bytes, got {}",
                bytes.len()
            )));
        }

        if let Some(&payload_offset) = self.active_chunks.get(&chunk_number) {
            self.overwrite_in_place(chunk_number, payload_offset, bytes)?;
            return Ok(());
        }

        if self.active_index.is_none() {
            self.open_fresh_delta_file()?;
        } else if self.active_chunks.len() >= self.chunks_per_file {
            self.finalize_current_file_with_next()?;
            self.open_fresh_delta_file()?;
        }

        self.append_delta_chunk(chunk_number, bytes)
    }

    fn open_fresh_delta_file(&mut self) -> Result<()> {
        let ext = delta_extension(self.next_delta_number as u32)?;
        let path = PathBuf::from(format!("{}.{ext}", self.delta_basename));
        let seg = SegmentFile::create_write(&path, SignatureFamily::Ewf, true, self.next_delta_number)?;
        self.next_delta_number += 1;
        self.delta_paths.push(path.clone());
        self.base.segments_mut().push(seg);
        self.active_index = Some(self.base.segments_mut().len() - 1);
        self.active_done_offset = None;
        self.active_chunks.clear();
        info!("opened delta file {}", path.display());
        Ok(())
    }

    fn append_delta_chunk(&mut self, chunk_number: usize, bytes: &[u8]) -> Result<()> {
        let idx = self.active_index.expect("delta file opened before append");

        if let Some(done_offset) = self.active_done_offset.take() {
            self.base.segments_mut()[idx].truncate(done_offset)?;
        }

        let seg = &mut self.base.segments_mut()[idx];
        let header_offset = seg.current_offset()?;
        let payload_len = DELTA_CHUNK_HEADER_SIZE as u64 + bytes.len() as u64 + 4;
        let size = SECTION_HEADER_SIZE + payload_len;
        let next_offset = header_offset + size;
        SectionHeader::new("delta_chunk", next_offset, size).write_to(&mut seg.file)?;
        let payload_start = seg.current_offset()?;
        delta_chunk::write_to(&mut seg.file, (chunk_number + 1) as u32, bytes)?;
        let payload_end = seg.current_offset()?;
        seg.push_section(SectionKind::DeltaChunk, header_offset, payload_start, payload_end);

        let data_offset = payload_start + DELTA_CHUNK_HEADER_SIZE as u64;
        self.active_chunks.insert(chunk_number, data_offset);

        self.base
            .offset_table_mut()
            .redirect_to_delta(chunk_number, idx, data_offset, bytes.len() as u32 + 4)?;
        self.base.invalidate_cache(chunk_number);

        // trailing `done`, overwritten the next time this file is extended (§4.7.6).
        let seg = &mut self.base.segments_mut()[idx];
        let done_offset = seg.current_offset()?;
        SectionHeader::new("done", done_offset, SECTION_HEADER_SIZE).write_to(&mut seg.file)?;
        seg.push_section(SectionKind::Done, done_offset, done_offset + SECTION_HEADER_SIZE, done_offset + SECTION_HEADER_SIZE);
        self.active_done_offset = Some(done_offset);

        Ok(())
    }

    fn overwrite_in_place(&mut self, chunk_number: usize, payload_offset: u64, bytes: &[u8]) -> Result<()> {
        let idx = self.active_index.expect("in-place entries only exist in the active file");
        let seg = &mut self.base.segments_mut()[idx];
        seg.seek_to(payload_offset)?;
        seg.file
            .write_all(bytes)
            .map_err(|e| Error::io("overwriting delta chunk payload", e))?;
        let checksum = adler32(bytes);
        seg.file
            .write_all(&checksum.to_le_bytes())
            .map_err(|e| Error::io("overwriting delta chunk checksum", e))?;
        self.base.invalidate_cache(chunk_number);
        Ok(())
    }

    fn finalize_current_file_with_next(&mut self) -> Result<()> {
        let idx = self.active_index.take().expect("finalize requires an open file");
        let done_offset = self
            .active_done_offset
            .take()
            .expect("an open delta file always carries a trailing done/next slot");
        let seg = &mut self.base.segments_mut()[idx];
        seg.truncate(done_offset)?;
        SectionHeader::new("next", done_offset, SECTION_HEADER_SIZE).write_to(&mut seg.file)?;
        seg.push_section(SectionKind::Next, done_offset, done_offset + SECTION_HEADER_SIZE, done_offset + SECTION_HEADER_SIZE);
        Ok(())
    }

    /// Ensures the active `.Dxx` file (if any) carries its trailing `done`
    /// marker and returns every delta file path written this session.
    pub fn finalize(mut self) -> Result<Vec<PathBuf>> {
        if let Some(idx) = self.active_index {
            if self.active_done_offset.is_none() {
                // shouldn't happen (append always re-emits done), but keep the
                // invariant explicit rather than leaving a file without a trailer.
                let seg = &mut self.base.segments_mut()[idx];
                let offset = seg.current_offset()?;
                SectionHeader::new("done", offset, SECTION_HEADER_SIZE).write_to(&mut seg.file)?;
            }
        }
        info!("finalized delta overlay {}: {} file(s)", self.delta_basename, self.delta_paths.len());
        Ok(self.delta_paths.clone())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.base.read(buf)
    }

    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        self.base.seek(offset)
    }

    pub fn media_values(&self) -> &crate::media::MediaValues {
        self.base.media_values()
    }

    pub fn get_hash_value(&self, key: &str) -> Result<String> {
        self.base.get_hash_value(key)
    }
}

/// Discovers every `.Dxx` file already belonging to `delta_basename`, for
/// resuming a delta session (mirrors [`crate::read::discover_siblings`]).
pub fn discover_delta_siblings(delta_basename: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let basename = delta_basename.as_ref().to_string_lossy().to_string();
    let pattern = format!("{basename}.d??");
    let mut found: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| Error::InvalidArgument(format!("bad glob pattern {pattern}: {e}")))?
        .filter_map(|r| r.ok())
        .collect();
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CompressionLevel, Format};
    use crate::sections::header::HeaderValues;
    use crate::write::{WriteHandle, WriteOptions};

    fn write_base_image(dir: &Path) -> (Vec<PathBuf>, usize) {
        let mut opts = WriteOptions::new(dir.join("IMG").to_string_lossy().to_string(), Format::Encase6);
        opts.sectors_per_chunk = 8;
        opts.bytes_per_sector = 512;
        opts.compression = CompressionLevel::None;
        let chunk_size = opts.sectors_per_chunk as usize * opts.bytes_per_sector as usize;
        let mut handle = WriteHandle::create(opts, HeaderValues::default()).unwrap();
        let data = vec![0u8; chunk_size * 2];
        handle.write(&data).unwrap();
        let paths = handle.finalize().unwrap();
        (paths, chunk_size)
    }

    #[test]
    fn write_chunk_creates_delta_file_and_shadows_read() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, chunk_size) = write_base_image(dir.path());

        let base = ReadHandle::open(&paths, crate::format::ErrorTolerance::Strict).unwrap();
        let delta_basename = dir.path().join("IMG").to_string_lossy().to_string();
        let mut delta = DeltaHandle::open(base, &[], delta_basename).unwrap();

        let replacement = vec![0xFFu8; chunk_size];
        delta.write_chunk(1, &replacement).unwrap();

        // reads consult the offset table, which the write above already
        // re-pointed at the new .Dxx file, without needing a finalize/reopen.
        delta.seek(chunk_size as u64).unwrap();
        let mut buf = vec![0u8; chunk_size];
        delta.read(&mut buf).unwrap();
        assert_eq!(buf, replacement);

        let produced = delta.finalize().unwrap();
        assert_eq!(produced.len(), 1);
        assert!(produced[0].to_string_lossy().ends_with(".d01"));
        let len = std::fs::metadata(&produced[0]).unwrap().len();
        assert!(len > chunk_size as u64);
    }
}
