//! End-to-end scenarios exercising only the public `Handle`/`ReadHandle`/
//! `WriteHandle`/`DeltaHandle` API, scaled down from the literal byte counts
//! so the suite runs quickly while keeping each scenario's shape intact.

use std::path::PathBuf;

use exhume_ewf::digest::DualDigest;
use exhume_ewf::format::{CompressionLevel, ErrorTolerance, Format};
use exhume_ewf::handle::Handle;
use exhume_ewf::read::ReadHandle;
use exhume_ewf::sections::header::HeaderValues;
use exhume_ewf::write::{WriteHandle, WriteOptions};

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect()
}

/// S-1: an all-zero image compresses every chunk identically (zero-block
/// cache) and the media values and digest match what the write engine saw.
#[test]
fn s1_all_zero_image_single_segment() {
    let dir = tempfile::tempdir().unwrap();
    let basename = dir.path().join("NAME").to_string_lossy().to_string();
    let mut opts = WriteOptions::new(basename, Format::Encase6);
    opts.sectors_per_chunk = 64;
    opts.bytes_per_sector = 512;
    opts.compression = CompressionLevel::Fast;
    let chunk_size = opts.sectors_per_chunk as usize * opts.bytes_per_sector as usize;

    let mut w = WriteHandle::create(opts, HeaderValues::default()).unwrap();
    let data = vec![0u8; chunk_size * 4];
    w.write(&data).unwrap();
    let paths = w.finalize().unwrap();

    assert_eq!(paths.len(), 1);
    assert!(paths[0].to_string_lossy().ends_with(".E01"));

    let mut r = ReadHandle::open(&paths, ErrorTolerance::Strict).unwrap();
    assert_eq!(r.media_values().number_of_chunks, 4);
    assert_eq!(r.media_values().media_size, data.len() as u64);

    let mut buf = vec![0u8; data.len()];
    let n = r.read(&mut buf).unwrap();
    assert_eq!(n, data.len());
    assert_eq!(buf, data);

    let mut expected = DualDigest::new();
    expected.update(&data);
    let (expected_md5, _) = expected.finalize();
    assert_eq!(r.md5().unwrap().to_vec(), expected_md5);
}

/// S-2/S-3: a multi-segment write, scaled down, round-trips byte-exact
/// through a fresh read and matches an independently computed digest.
#[test]
fn s2_s3_multi_segment_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let basename = dir.path().join("X").to_string_lossy().to_string();
    let mut opts = WriteOptions::new(basename, Format::Encase5);
    opts.sectors_per_chunk = 8;
    opts.bytes_per_sector = 512;
    opts.max_segment_size = 16 * 1024;
    opts.compression = CompressionLevel::Fast;
    let chunk_size = opts.sectors_per_chunk as usize * opts.bytes_per_sector as usize;

    let data = pseudo_random(chunk_size * 40, 0xC0FFEE);
    let mut w = WriteHandle::create(opts, HeaderValues::default()).unwrap();
    w.write(&data).unwrap();
    let paths = w.finalize().unwrap();

    assert!(paths.len() >= 2, "small max_segment_size should force a rollover");
    assert!(paths.last().unwrap().to_string_lossy().ends_with(".E02") || paths.len() > 2);

    let mut r = ReadHandle::open(&paths, ErrorTolerance::Strict).unwrap();
    let mut buf = vec![0u8; data.len()];
    let n = r.read(&mut buf).unwrap();
    assert_eq!(n, data.len());
    assert_eq!(buf, data);

    let mut expected = DualDigest::new();
    expected.update(&data);
    let (_, expected_sha1) = expected.finalize();
    assert_eq!(r.sha1().unwrap().to_vec(), expected_sha1);
    assert!(r.crc_errors().is_empty());
}

/// S-5 (simplified): aborting before any chunk has been flushed leaves a
/// segment file holding only its header/volume sections; resuming picks up
/// at chunk 0 and produces an image identical to an uninterrupted write.
#[test]
fn s5_resume_from_a_fresh_segment_matches_uninterrupted_write() {
    let dir = tempfile::tempdir().unwrap();
    let basename = dir.path().join("RESUME").to_string_lossy().to_string();
    let data = pseudo_random(8192 * 5 + 37, 0xBEEF);

    // Uninterrupted baseline.
    let baseline_dir = tempfile::tempdir().unwrap();
    let baseline_basename = baseline_dir.path().join("BASELINE").to_string_lossy().to_string();
    let mut baseline_opts = WriteOptions::new(baseline_basename, Format::Encase6);
    baseline_opts.sectors_per_chunk = 16;
    baseline_opts.bytes_per_sector = 512;
    let mut baseline = WriteHandle::create(baseline_opts, HeaderValues::default()).unwrap();
    baseline.write(&data).unwrap();
    let baseline_paths = baseline.finalize().unwrap();

    // Aborted write: open, write less than one full chunk, then drop without finalizing.
    let mut opts = WriteOptions::new(basename.clone(), Format::Encase6);
    opts.sectors_per_chunk = 16;
    opts.bytes_per_sector = 512;
    let chunk_size = opts.sectors_per_chunk as usize * opts.bytes_per_sector as usize;
    {
        let mut w = WriteHandle::create(opts.clone(), HeaderValues::default()).unwrap();
        w.write(&data[..chunk_size / 2]).unwrap();
        // dropped here: simulates a crash before any full chunk was flushed.
    }

    let segment_path = PathBuf::from(format!("{basename}.E01"));
    assert!(segment_path.exists());

    let resumed = WriteHandle::open_resume(opts, &[segment_path], HeaderValues::default()).unwrap();
    assert_eq!(resumed.resume_offset(), 0);
    let mut resumed = resumed;
    resumed.write(&data).unwrap();
    let resumed_paths = resumed.finalize().unwrap();

    let mut r_resumed = ReadHandle::open(&resumed_paths, ErrorTolerance::Strict).unwrap();
    let mut r_baseline = ReadHandle::open(&baseline_paths, ErrorTolerance::Strict).unwrap();

    let mut buf_resumed = vec![0u8; data.len()];
    let mut buf_baseline = vec![0u8; data.len()];
    r_resumed.read(&mut buf_resumed).unwrap();
    r_baseline.read(&mut buf_baseline).unwrap();
    assert_eq!(buf_resumed, buf_baseline);
    assert_eq!(r_resumed.md5(), r_baseline.md5());
}

/// S-6: writing a replacement chunk through the delta overlay shadows the
/// base image without modifying it, observable purely through `Handle`.
#[test]
fn s6_delta_overlay_shadows_one_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let basename = dir.path().join("NAME").to_string_lossy().to_string();
    let mut opts = WriteOptions::new(basename.clone(), Format::Encase6);
    opts.sectors_per_chunk = 64;
    opts.bytes_per_sector = 512;
    let chunk_size = opts.sectors_per_chunk as usize * opts.bytes_per_sector as usize;

    let mut w = WriteHandle::create(opts, HeaderValues::default()).unwrap();
    let data = vec![0u8; chunk_size * 3];
    w.write(&data).unwrap();
    let base_paths = w.finalize().unwrap();

    let mut handle = Handle::open_delta(&base_paths, &[], basename.clone()).unwrap();
    let replacement = vec![0xFFu8; chunk_size];
    match &mut handle {
        Handle::Delta(d) => d.write_chunk(1, &replacement).unwrap(),
        _ => unreachable!(),
    }
    let produced = handle.close().unwrap();
    assert_eq!(produced.len(), 1);
    assert!(produced[0].to_string_lossy().ends_with(".d01"));

    let mut r = Handle::open_read(&base_paths).unwrap();
    let mut buf = vec![0u8; data.len()];
    r.read(&mut buf).unwrap();
    assert_eq!(&buf[..chunk_size], &vec![0u8; chunk_size][..]);

    let delta_paths = exhume_ewf::delta::discover_delta_siblings(&basename).unwrap();
    let mut shadowed = Handle::open_delta(&base_paths, &delta_paths, basename).unwrap();
    let mut shadowed_buf = vec![0u8; data.len()];
    shadowed.read(&mut shadowed_buf).unwrap();
    assert_eq!(&shadowed_buf[..chunk_size], &vec![0u8; chunk_size][..]);
    assert_eq!(&shadowed_buf[chunk_size..chunk_size * 2], &replacement[..]);
    assert_eq!(&shadowed_buf[chunk_size * 2..], &vec![0u8; chunk_size][..]);
}
