//! E2E Test Suite 04: BAI / BTI range indices
//!
//! Builds both index formats over a synthetic multi-reference BAM and
//! checks region queries against a brute-force scan, write/load/write
//! idempotence, cache-mode equivalence, the unsorted-input guard, and
//! the stale-BTI-version policy.

use bam::error::{BamError, IndexErrorKind};
use bam::index::bai::BaiIndex;
use bam::{
    BamAlignment, BamReader, BamRegion, BamWriter, CigarOp, IndexCacheMode, IndexKind, RefData,
    WriterOptions,
};
use std::fs;
use tempfile::TempDir;

const REF_LEN: i32 = 2_000_000;

fn references() -> Vec<RefData> {
    vec![
        RefData::new("seq1", REF_LEN),
        RefData::new("seq2", REF_LEN), // intentionally left empty
        RefData::new("seq3", REF_LEN),
    ]
}

/// Deterministic generator so every run indexes the same file.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[derive(Clone)]
struct Placed {
    name: String,
    ref_id: i32,
    position: i32,
    end: i32, // exclusive
}

fn make_record(name: &str, ref_id: i32, position: i32, len: u32) -> BamAlignment {
    let mut al = BamAlignment::new();
    al.name = name.to_string();
    al.ref_id = ref_id;
    al.position = position;
    al.map_quality = 40;
    al.cigar = vec![CigarOp::new('M', len)];
    al.query_bases = "ACGT".chars().cycle().take(len as usize).collect();
    al.qualities = "E".repeat(len as usize);
    al.length = len as i32;
    al.bin = BaiIndex::bin_for_interval(position, position + len as i32);
    al.mate_ref_id = -1;
    al.mate_position = -1;
    al
}

/// Writes the synthetic file and returns its records' placements in
/// file order.
fn write_indexed_bam(path: &str) -> Vec<Placed> {
    let mut rng = Lcg(0x5eed_5eed);
    let mut placed = Vec::new();
    let mut writer =
        BamWriter::create(path, "@HD\tVN:1.6\tSO:coordinate\n", &references(), WriterOptions::default())
            .unwrap();

    for (ref_id, count) in [(0i32, 3000usize), (2, 1500)] {
        let mut position = 0i32;
        for i in 0..count {
            position += (rng.next() % 550) as i32;
            let len = 30 + (rng.next() % 120) as u32;
            let name = format!("r{ref_id}_{i:05}");
            let al = make_record(&name, ref_id, position, len);
            placed.push(Placed {
                name,
                ref_id,
                position,
                end: position + len as i32,
            });
            writer.save_alignment(&al).unwrap();
        }
    }

    // Unmapped tail, as coordinate sort places it.
    for i in 0..5 {
        let mut al = make_record(&format!("unmapped_{i}"), 0, 0, 36);
        al.ref_id = -1;
        al.position = -1;
        al.set_is_mapped(false);
        al.bin = 0;
        placed.push(Placed {
            name: al.name.clone(),
            ref_id: -1,
            position: -1,
            end: -1,
        });
        writer.save_alignment(&al).unwrap();
    }

    writer.close().unwrap();
    placed
}

/// Mirrors the reader's overlap rules for an expected-set oracle.
fn overlaps(p: &Placed, region: &BamRegion) -> bool {
    let right_specified = region.right_ref_id >= 0 && region.right_position >= 1;
    if p.ref_id < region.left_ref_id {
        return false;
    }
    if p.ref_id == region.left_ref_id {
        if p.position >= region.left_position {
            if right_specified
                && region.left_ref_id == region.right_ref_id
                && p.position > region.right_position
            {
                return false;
            }
            return true;
        }
        return p.end >= region.left_position;
    }
    if !right_specified {
        return true;
    }
    if p.ref_id < region.right_ref_id {
        return true;
    }
    if p.ref_id > region.right_ref_id {
        return false;
    }
    p.position <= region.right_position
}

fn collect_region(reader: &mut BamReader, region: BamRegion) -> Vec<String> {
    reader.set_region(region).unwrap();
    let mut names = Vec::new();
    let mut al = BamAlignment::new();
    while reader.next_alignment(&mut al).unwrap() {
        names.push(al.name.clone());
    }
    names
}

fn query_regions() -> Vec<BamRegion> {
    vec![
        BamRegion::new(0, 100, 0, 2_000),
        BamRegion::new(0, 500_000, 0, 510_000),
        BamRegion::from(0, 600_000),
        BamRegion::new(0, 700_000, 2, 5_000),
        BamRegion::from(1, 0),             // empty reference, no right bound
        BamRegion::new(1, 0, 1, 10_000),   // bounded inside the empty reference
        BamRegion::new(2, 1_900_000, 2, 1_950_000), // beyond the last alignment
        BamRegion::new(2, 0, 2, 400),
    ]
}

fn check_all_regions(reader: &mut BamReader, placed: &[Placed]) {
    for region in query_regions() {
        let expected: Vec<String> = placed
            .iter()
            .filter(|p| overlaps(p, &region))
            .map(|p| p.name.clone())
            .collect();
        let got = collect_region(reader, region);
        assert_eq!(
            got, expected,
            "region ({}, {}, {}, {})",
            region.left_ref_id, region.left_position, region.right_ref_id, region.right_position
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: BAI region queries match a brute-force scan
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_bai_region_queries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("q.bam").to_str().unwrap().to_string();
    let placed = write_indexed_bam(&path);

    let mut reader = BamReader::open(&path).unwrap();
    reader.create_index(IndexKind::Bai).unwrap();
    assert!(fs::metadata(format!("{path}.bai")).is_ok());
    check_all_regions(&mut reader, &placed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: BTI region queries return the same answers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_bti_region_queries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("q.bam").to_str().unwrap().to_string();
    let placed = write_indexed_bam(&path);

    let mut reader = BamReader::open(&path).unwrap();
    reader.create_index(IndexKind::Bti).unwrap();
    assert!(fs::metadata(format!("{path}.bti")).is_ok());
    check_all_regions(&mut reader, &placed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: both formats agree on every region
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_formats_agree() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("q.bam").to_str().unwrap().to_string();
    write_indexed_bam(&path);

    let mut bai_reader = BamReader::open(&path).unwrap();
    bai_reader.create_index(IndexKind::Bai).unwrap();
    let mut bti_reader = BamReader::open(&path).unwrap();
    bti_reader.create_index(IndexKind::Bti).unwrap();

    for region in query_regions() {
        let from_bai = collect_region(&mut bai_reader, region);
        let from_bti = collect_region(&mut bti_reader, region);
        assert_eq!(from_bai, from_bti);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: write → load → write reproduces byte-identical index files
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_index_write_idempotence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("q.bam").to_str().unwrap().to_string();
    write_indexed_bam(&path);

    let mut reader = BamReader::open(&path).unwrap();
    reader.create_index(IndexKind::Bai).unwrap();
    reader.create_index(IndexKind::Bti).unwrap();

    for ext in [".bai", ".bti"] {
        let original = format!("{path}{ext}");
        let copy = format!("{path}{ext}.copy");
        let mut index = bam::BamIndex::load(&original, IndexCacheMode::Full).unwrap();
        index.write(&copy).unwrap();
        assert_eq!(
            fs::read(&original).unwrap(),
            fs::read(&copy).unwrap(),
            "{ext} rewrite must be byte-identical"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: cache modes answer identically
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_cache_modes_equivalent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("q.bam").to_str().unwrap().to_string();
    let placed = write_indexed_bam(&path);

    let mut reader = BamReader::open(&path).unwrap();
    reader.create_index(IndexKind::Bai).unwrap();
    let index_path = format!("{path}.bai");

    for mode in [IndexCacheMode::Full, IndexCacheMode::Limited, IndexCacheMode::None] {
        let mut r = BamReader::open(&path).unwrap();
        r.set_index_cache_mode(mode);
        r.open_index(&index_path).unwrap();
        check_all_regions(&mut r, &placed);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: locate_index prefers the requested format
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_locate_index() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("q.bam").to_str().unwrap().to_string();
    write_indexed_bam(&path);

    let mut reader = BamReader::open(&path).unwrap();
    assert!(!reader.locate_index(IndexKind::Bai).unwrap());

    reader.create_index(IndexKind::Bai).unwrap();
    reader.create_index(IndexKind::Bti).unwrap();

    let mut fresh = BamReader::open(&path).unwrap();
    assert!(fresh.locate_index(IndexKind::Bti).unwrap());
    assert!(fresh.has_index());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: unsorted input refuses to index
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unsorted_input_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("unsorted.bam").to_str().unwrap().to_string();

    let mut writer =
        BamWriter::create(&path, "", &references(), WriterOptions::default()).unwrap();
    writer.save_alignment(&make_record("a", 0, 5_000, 50)).unwrap();
    writer.save_alignment(&make_record("b", 0, 100, 50)).unwrap(); // out of order
    writer.close().unwrap();

    let mut reader = BamReader::open(&path).unwrap();
    let err = reader.create_index(IndexKind::Bai).unwrap_err();
    match err {
        BamError::Index(e) => assert_eq!(e.kind, IndexErrorKind::UnsortedInput),
        other => panic!("unexpected error: {other}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: stale BTI versions are refused with rebuild advice
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_stale_bti_version_refused() {
    let dir = TempDir::new().unwrap();
    let bam_path = dir.path().join("v.bam").to_str().unwrap().to_string();
    write_indexed_bam(&bam_path);

    let stale = dir.path().join("v.bam.bti").to_str().unwrap().to_string();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"BTI\x01");
    bytes.extend_from_slice(&2u32.to_le_bytes()); // version 2: refused
    bytes.extend_from_slice(&1000u32.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    fs::write(&stale, &bytes).unwrap();

    let mut reader = BamReader::open(&bam_path).unwrap();
    let err = reader.open_index(&stale).unwrap_err();
    let msg = err.to_string();
    match err {
        BamError::Index(e) => assert_eq!(e.kind, IndexErrorKind::StaleVersion),
        other => panic!("unexpected error: {other}"),
    }
    assert!(msg.contains("rebuild"), "message should advise rebuild: {msg}");
}
