//! Unified public handle (§6): one `Handle` type fronting the read, write,
//! and delta engines so callers (the CLI included) don't match on which
//! engine backs a given open image.

use std::path::PathBuf;

use crate::delta::DeltaHandle;
use crate::error::{Error, Result};
use crate::format::{CompressionLevel, ErrorTolerance, Format};
use crate::media::MediaValues;
use crate::read::ReadHandle;
use crate::sections::header::HeaderValues;
use crate::write::{WriteHandle, WriteOptions};

/// An open EWF image, in exactly one of the three modes the engines support.
pub enum Handle {
    Read(ReadHandle),
    Write(WriteHandle),
    Delta(DeltaHandle),
}

impl Handle {
    /// Opens an existing image read-only (§4.5).
    pub fn open_read(paths: &[PathBuf]) -> Result<Self> {
        Ok(Handle::Read(ReadHandle::open(paths, ErrorTolerance::Compensate)?))
    }

    /// Begins a fresh write (§4.6). `media_values` supplies the acquisition
    /// geometry (sectors-per-chunk, bytes-per-sector, and an optional size
    /// hint); `basename` and `compression` round out the options the write
    /// engine needs up front.
    pub fn open_write(
        basename: impl Into<String>,
        format: Format,
        sectors_per_chunk: u32,
        bytes_per_sector: u32,
        media_size_hint: u64,
        compression: CompressionLevel,
    ) -> Result<Self> {
        let mut options = WriteOptions::new(basename, format);
        options.sectors_per_chunk = sectors_per_chunk;
        options.bytes_per_sector = bytes_per_sector;
        options.media_size_hint = media_size_hint;
        options.compression = compression;
        Ok(Handle::Write(WriteHandle::create(options, HeaderValues::default())?))
    }

    /// Reopens an interrupted write and picks up where it left off (§4.6, "Resume").
    pub fn open_write_resume(paths: &[PathBuf], format: Format) -> Result<Self> {
        let basename = resume_basename(paths)?;
        let options = WriteOptions::new(basename, format);
        Ok(Handle::Write(WriteHandle::open_resume(options, paths, HeaderValues::default())?))
    }

    /// Opens a delta-chunk overlay session against an existing image (§4.7).
    /// `base_paths` is the underlying image's own segment files;
    /// `delta_paths` is any already-written `.Dxx` chain (empty for a fresh overlay).
    pub fn open_delta(base_paths: &[PathBuf], delta_paths: &[PathBuf], delta_basename: impl Into<String>) -> Result<Self> {
        let base = ReadHandle::open(base_paths, ErrorTolerance::Compensate)?;
        Ok(Handle::Delta(DeltaHandle::open(base, delta_paths, delta_basename)?))
    }

    /// Fills `buf` from the handle's current position, returning the number
    /// of bytes actually copied. Read and delta handles only.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Handle::Read(h) => h.read(buf),
            Handle::Delta(h) => h.read(buf),
            Handle::Write(_) => Err(Error::InvalidArgument("read on a write-only handle".into())),
        }
    }

    /// Appends `data` to the image being written. Write handles only (§5, append-only).
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self {
            Handle::Write(h) => h.write(data),
            Handle::Read(_) | Handle::Delta(_) => {
                Err(Error::InvalidArgument("write on a non-write handle".into()))
            }
        }
    }

    /// Repositions a read or delta handle's cursor. Write handles are append-only (§5).
    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        match self {
            Handle::Read(h) => h.seek(offset),
            Handle::Delta(h) => h.seek(offset),
            Handle::Write(_) => Err(Error::InvalidArgument("seek on a write-only handle".into())),
        }
    }

    pub fn get_media_values(&self) -> &MediaValues {
        match self {
            Handle::Read(h) => h.media_values(),
            Handle::Write(h) => h.media_values(),
            Handle::Delta(h) => h.media_values(),
        }
    }

    /// Looks up a hash/metadata value by key (`"MD5"`, `"SHA1"`, or any
    /// acquisition-metadata field name).
    pub fn get_hash_values(&self, key: &str) -> Result<String> {
        match self {
            Handle::Read(h) => h.get_hash_value(key),
            Handle::Delta(h) => h.get_hash_value(key),
            Handle::Write(_) => Err(Error::InvalidArgument("hash values are not available mid-write".into())),
        }
    }

    /// Overrides a hash value emitted by `finalize`. Write handles only.
    pub fn set_hash_values(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        match self {
            Handle::Write(h) => {
                h.set_hash_value(key, value);
                Ok(())
            }
            Handle::Read(_) | Handle::Delta(_) => {
                Err(Error::InvalidArgument("cannot set hash values on a read-only handle".into()))
            }
        }
    }

    /// Records a bad-sector range found during acquisition. Write handles only.
    pub fn add_acquisition_error(&mut self, first_sector: u32, sector_count: u32) -> Result<()> {
        match self {
            Handle::Write(h) => {
                h.add_acquisition_error(first_sector, sector_count);
                Ok(())
            }
            Handle::Read(_) | Handle::Delta(_) => Err(Error::InvalidArgument(
                "cannot record acquisition errors on a read-only handle".into(),
            )),
        }
    }

    /// Number of sector ranges that failed checksum verification so far.
    /// Read and delta handles only; always `0` for a write handle.
    pub fn crc_error_count(&self) -> usize {
        match self {
            Handle::Read(h) => h.crc_errors().len(),
            Handle::Delta(_) | Handle::Write(_) => 0,
        }
    }

    /// Byte offset into the original input stream a resumed write should
    /// continue feeding from. Only meaningful right after `open_write_resume`.
    pub fn resume_offset(&self) -> Result<u64> {
        match self {
            Handle::Write(h) => Ok(h.resume_offset()),
            _ => Err(Error::InvalidArgument("resume_offset is only meaningful on a write handle".into())),
        }
    }

    /// Closes the handle, finalizing a write or delta session. Read handles
    /// simply drop.
    pub fn close(self) -> Result<Vec<PathBuf>> {
        match self {
            Handle::Read(_) => Ok(Vec::new()),
            Handle::Write(h) => h.finalize(),
            Handle::Delta(h) => h.finalize(),
        }
    }
}

/// Derives the shared basename (`"NAME"` from `"NAME.E01"`) from a set of
/// segment-file paths, the way a resumed write needs to re-derive its output
/// target from the files on disk rather than being told it again.
fn resume_basename(paths: &[PathBuf]) -> Result<String> {
    let first = paths
        .first()
        .ok_or_else(|| Error::InvalidArgument("no segment files given to resume".into()))?;
    let stem = first
        .to_str()
        .and_then(|s| s.rsplit_once('.'))
        .map(|(base, _)| base.to_string())
        .ok_or_else(|| Error::InvalidArgument(format!("cannot derive basename from {}", first.display())))?;
    Ok(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let basename = dir.path().join("IMG").to_string_lossy().to_string();
        let mut w = Handle::open_write(basename, Format::Encase6, 8, 512, 0, CompressionLevel::Fast).unwrap();
        let chunk_size = w.get_media_values().chunk_size as usize;
        let data = vec![0xCDu8; chunk_size * 2 + 17];
        w.write(&data).unwrap();
        let paths = w.close().unwrap();

        let mut r = Handle::open_read(&paths).unwrap();
        let mut buf = vec![0u8; data.len()];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(buf, data);
    }

    #[test]
    fn write_handle_rejects_read() {
        let dir = tempfile::tempdir().unwrap();
        let basename = dir.path().join("IMG").to_string_lossy().to_string();
        let mut w = Handle::open_write(basename, Format::Encase6, 8, 512, 0, CompressionLevel::Fast).unwrap();
        let mut buf = [0u8; 4];
        assert!(w.read(&mut buf).is_err());
    }
}
