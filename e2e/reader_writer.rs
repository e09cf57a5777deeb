//! E2E Test Suite 03: reader + writer file operations
//!
//! Header and reference-dictionary round-trips, whole-file copies
//! through the reader → writer pipeline, rewind semantics, and
//! truncated-file tolerance.

use bam::index::bai::BaiIndex;
use bam::record::codec::encode_record;
use bam::{BamAlignment, BamReader, BamWriter, CigarOp, RefData, WriterOptions};
use std::fs;
use tempfile::TempDir;

const HEADER_TEXT: &str = "@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:seq1\tLN:1575\n@SQ\tSN:seq2\tLN:1584\n";

fn references() -> Vec<RefData> {
    vec![RefData::new("seq1", 1575), RefData::new("seq2", 1584)]
}

fn make_record(name: &str, ref_id: i32, position: i32, len: u32) -> BamAlignment {
    let mut al = BamAlignment::new();
    al.name = name.to_string();
    al.ref_id = ref_id;
    al.position = position;
    al.map_quality = 30;
    al.cigar = vec![CigarOp::new('M', len)];
    al.query_bases = "ACGT".chars().cycle().take(len as usize).collect();
    al.qualities = "F".repeat(len as usize);
    al.length = len as i32;
    al.bin = BaiIndex::bin_for_interval(position, position + len as i32);
    al.mate_ref_id = -1;
    al.mate_position = -1;
    al
}

fn write_test_bam(path: &str, records: &[BamAlignment]) {
    let mut writer =
        BamWriter::create(path, HEADER_TEXT, &references(), WriterOptions::default()).unwrap();
    for r in records {
        writer.save_alignment(r).unwrap();
    }
    writer.close().unwrap();
}

fn sample_records() -> Vec<BamAlignment> {
    let mut records = Vec::new();
    for i in 0..40 {
        records.push(make_record(&format!("r1_{i:03}"), 0, 10 + i * 35, 50));
    }
    for i in 0..25 {
        records.push(make_record(&format!("r2_{i:03}"), 1, 5 + i * 60, 40));
    }
    records
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: header text and reference dictionary round-trip
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_header_and_references() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hdr.bam").to_str().unwrap().to_string();
    write_test_bam(&path, &sample_records());

    let reader = BamReader::open(&path).unwrap();
    assert_eq!(reader.header_text(), HEADER_TEXT);
    assert_eq!(reader.reference_count(), 2);
    assert_eq!(reader.references()[0], RefData::new("seq1", 1575));
    assert_eq!(reader.references()[1], RefData::new("seq2", 1584));
    assert_eq!(reader.reference_id("seq2"), Some(1));
    assert_eq!(reader.reference_id("chrMT"), None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: record-by-record copy preserves every alignment byte
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_copy_preserves_alignment_bytes() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src.bam").to_str().unwrap().to_string();
    let dst = dir.path().join("dst.bam").to_str().unwrap().to_string();
    write_test_bam(&src, &sample_records());

    // Copy in core-only mode; raw record bytes pass through untouched.
    {
        let mut reader = BamReader::open(&src).unwrap();
        let mut writer = BamWriter::create(
            &dst,
            reader.header_text().to_string().as_str(),
            &reader.references().to_vec(),
            WriterOptions::default(),
        )
        .unwrap();
        let mut al = BamAlignment::new();
        while reader.next_alignment_core(&mut al).unwrap() {
            writer.save_alignment(&al).unwrap();
        }
        writer.close().unwrap();
    }

    // Both files decode to identical wire records (BGZF framing may
    // differ; alignment bytes must not).
    let collect_wire = |path: &str| -> Vec<Vec<u8>> {
        let mut reader = BamReader::open(path).unwrap();
        let mut al = BamAlignment::new();
        let mut out = Vec::new();
        while reader.next_alignment_core(&mut al).unwrap() {
            let mut wire = Vec::new();
            encode_record(&al, &mut wire).unwrap();
            out.push(wire);
        }
        out
    };
    assert_eq!(collect_wire(&src), collect_wire(&dst));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: rewind restarts the stream and clears any region
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_rewind() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rw.bam").to_str().unwrap().to_string();
    let records = sample_records();
    write_test_bam(&path, &records);

    let mut reader = BamReader::open(&path).unwrap();
    let mut al = BamAlignment::new();
    for _ in 0..10 {
        assert!(reader.next_alignment(&mut al).unwrap());
    }
    assert_eq!(al.name, "r1_009");

    reader.rewind().unwrap();
    assert!(reader.next_alignment(&mut al).unwrap());
    assert_eq!(al.name, "r1_000");

    // Full count after rewind matches the file.
    let mut count = 1;
    while reader.next_alignment(&mut al).unwrap() {
        count += 1;
    }
    assert_eq!(count, records.len());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: a file missing its EOF marker still reads
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_eof_marker_tolerated() {
    let dir = TempDir::new().unwrap();
    let full = dir.path().join("full.bam").to_str().unwrap().to_string();
    let cut = dir.path().join("cut.bam").to_str().unwrap().to_string();
    let records = sample_records();
    write_test_bam(&full, &records);

    let bytes = fs::read(&full).unwrap();
    fs::write(&cut, &bytes[..bytes.len() - 28]).unwrap();

    // Open warns (via log) but succeeds; every record is still there.
    let mut reader = BamReader::open(&cut).unwrap();
    let mut al = BamAlignment::new();
    let mut count = 0;
    while reader.next_alignment(&mut al).unwrap() {
        count += 1;
    }
    assert_eq!(count, records.len());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: not-a-BAM input fails with BadMagic
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_bad_magic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("not_bam.bam").to_str().unwrap().to_string();

    // Valid BGZF stream whose payload is not a BAM header.
    let device = bam::device::IoDevice::open_write(&path).unwrap();
    let mut stream = bam::BgzfStream::writer(device, true);
    stream.write(b"GIF89a....................").unwrap();
    stream.finish().unwrap();

    let err = BamReader::open(&path).unwrap_err();
    assert!(matches!(err, bam::BamError::Format(_)), "got {err}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: empty BAM (header, zero records) reads cleanly
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_bam() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.bam").to_str().unwrap().to_string();
    write_test_bam(&path, &[]);

    let mut reader = BamReader::open(&path).unwrap();
    assert_eq!(reader.reference_count(), 2);
    let mut al = BamAlignment::new();
    assert!(!reader.next_alignment(&mut al).unwrap());
}
