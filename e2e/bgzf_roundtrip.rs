//! E2E Test Suite 01: BGZF codec
//!
//! Round-trips byte streams through the BGZF writer and reader over
//! real temp files, and pins the virtual-offset contract: `tell` names
//! a resumable position, `seek` resumes it, and a finished file ends in
//! the fixed 28-byte EOF marker.

use bam::bgzf::{BgzfStream, BGZF_EOF_MARKER};
use bam::device::IoDevice;
use std::fs;
use tempfile::TempDir;

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn write_bgzf(path: &str, data: &[u8], compressed: bool) {
    let device = IoDevice::open_write(path).unwrap();
    let mut stream = BgzfStream::writer(device, compressed);
    assert_eq!(stream.write(data).unwrap(), data.len());
    stream.finish().unwrap();
}

fn read_all(stream: &mut BgzfStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: multi-block round-trip
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_multiple_blocks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.bgzf");
    let path = path.to_str().unwrap();

    // Larger than two uncompressed blocks.
    let original = patterned(200_000);
    write_bgzf(path, &original, true);

    let device = IoDevice::open_read(path).unwrap();
    let mut stream = BgzfStream::reader(device);
    assert_eq!(read_all(&mut stream), original);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: EOF marker terminates the file
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_eof_marker_written_on_finish() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.bgzf");
    let path = path.to_str().unwrap();

    write_bgzf(path, b"hello bgzf", true);

    let bytes = fs::read(path).unwrap();
    assert!(bytes.len() > BGZF_EOF_MARKER.len());
    assert_eq!(&bytes[bytes.len() - 28..], &BGZF_EOF_MARKER);

    let device = IoDevice::open_read(path).unwrap();
    let mut stream = BgzfStream::reader(device);
    assert!(stream.has_eof_marker().unwrap());
    assert_eq!(read_all(&mut stream), b"hello bgzf");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: empty stream is a bare EOF marker
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_stream() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.bgzf");
    let path = path.to_str().unwrap();

    write_bgzf(path, b"", true);
    assert_eq!(fs::read(path).unwrap(), BGZF_EOF_MARKER);

    let device = IoDevice::open_read(path).unwrap();
    let mut stream = BgzfStream::reader(device);
    assert_eq!(read_all(&mut stream), b"");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: uncompressed (level 0) blocks round-trip
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_uncompressed_blocks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stored.bgzf");
    let path = path.to_str().unwrap();

    let original = patterned(150_000);
    write_bgzf(path, &original, false);

    // Stored blocks are larger than the payload, never smaller.
    assert!(fs::read(path).unwrap().len() > original.len());

    let device = IoDevice::open_read(path).unwrap();
    let mut stream = BgzfStream::reader(device);
    assert_eq!(read_all(&mut stream), original);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: tell/seek — a virtual offset resumes the exact stream position
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_virtual_offset_resume() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seek.bgzf");
    let path = path.to_str().unwrap();

    let original = patterned(180_000);
    write_bgzf(path, &original, true);

    // Read an uneven prefix, capture tell(), read a probe window.
    let device = IoDevice::open_read(path).unwrap();
    let mut stream = BgzfStream::reader(device);
    let mut prefix = vec![0u8; 70_123];
    stream.read_exact(&mut prefix).unwrap();
    let voffset = stream.tell();
    let mut expected = vec![0u8; 50_000];
    stream.read_exact(&mut expected).unwrap();

    // Seek back and the probe window must replay byte-for-byte.
    stream.seek(voffset).unwrap();
    let mut replay = vec![0u8; 50_000];
    stream.read_exact(&mut replay).unwrap();
    assert_eq!(replay, expected);

    // A fresh stream seeked to the same offset agrees too.
    let device = IoDevice::open_read(path).unwrap();
    let mut fresh = BgzfStream::reader(device);
    fresh.seek(voffset).unwrap();
    let mut fresh_replay = vec![0u8; 50_000];
    fresh.read_exact(&mut fresh_replay).unwrap();
    assert_eq!(fresh_replay, expected);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: write-side tell matches read-side positions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_writer_tell_is_a_readable_offset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wtell.bgzf");
    let path = path.to_str().unwrap();

    let first = patterned(90_000);
    let second = b"SECOND-SEGMENT".to_vec();

    let device = IoDevice::open_write(path).unwrap();
    let mut writer = BgzfStream::writer(device, true);
    writer.write(&first).unwrap();
    let voffset = writer.tell();
    writer.write(&second).unwrap();
    writer.finish().unwrap();

    let device = IoDevice::open_read(path).unwrap();
    let mut reader = BgzfStream::reader(device);
    reader.seek(voffset).unwrap();
    let mut got = vec![0u8; second.len()];
    reader.read_exact(&mut got).unwrap();
    assert_eq!(got, second);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: corrupt headers are rejected
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_corrupt_header_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.bgzf");
    let path_str = path.to_str().unwrap();

    write_bgzf(path_str, b"payload", true);
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = 0x00; // break the gzip magic
    fs::write(&path, &bytes).unwrap();

    let device = IoDevice::open_read(path_str).unwrap();
    let mut stream = BgzfStream::reader(device);
    let mut buf = [0u8; 16];
    let err = stream.read(&mut buf).unwrap_err();
    assert!(matches!(err, bam::BamError::Bgzf(_)), "got {err}");
}
