//! E2E Test Suite 05: multi-reader merge
//!
//! Merges several BAM inputs and checks global ordering (position and
//! read-name), merge stability, region forwarding, header unification,
//! empty-input exclusion, and the reference-dictionary guard.

use bam::index::bai::BaiIndex;
use bam::{
    BamAlignment, BamMultiReader, BamRegion, BamWriter, CigarOp, IndexKind, MultiReaderOptions,
    RefData, SortOrder, WriterOptions,
};
use tempfile::TempDir;

fn references() -> Vec<RefData> {
    vec![RefData::new("chrA", 500_000), RefData::new("chrB", 500_000)]
}

fn make_record(name: &str, ref_id: i32, position: i32) -> BamAlignment {
    let mut al = BamAlignment::new();
    al.name = name.to_string();
    al.ref_id = ref_id;
    al.position = position;
    al.map_quality = 20;
    al.cigar = vec![CigarOp::new('M', 50)];
    al.query_bases = "ACGT".chars().cycle().take(50).collect();
    al.qualities = "D".repeat(50);
    al.length = 50;
    al.bin = BaiIndex::bin_for_interval(position, position + 50);
    al.mate_ref_id = -1;
    al.mate_position = -1;
    al
}

fn unmapped(name: &str) -> BamAlignment {
    let mut al = make_record(name, -1, -1);
    al.set_is_mapped(false);
    al.bin = 0;
    al
}

fn write_bam(path: &str, header_text: &str, refs: &[RefData], records: &[BamAlignment]) {
    let mut writer = BamWriter::create(path, header_text, refs, WriterOptions::default()).unwrap();
    for r in records {
        writer.save_alignment(r).unwrap();
    }
    writer.close().unwrap();
}

fn drain(multi: &mut BamMultiReader) -> Vec<BamAlignment> {
    let mut out = Vec::new();
    let mut al = BamAlignment::new();
    while multi.next_alignment(&mut al).unwrap() {
        out.push(al.clone());
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: ByPosition merge is globally monotone, unmapped last
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_position_merge_is_monotone() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bam").to_str().unwrap().to_string();
    let b = dir.path().join("b.bam").to_str().unwrap().to_string();
    let c = dir.path().join("c.bam").to_str().unwrap().to_string();

    write_bam(
        &a,
        "",
        &references(),
        &[
            make_record("a0", 0, 100),
            make_record("a1", 0, 4_000),
            make_record("a2", 1, 50),
            unmapped("a3"),
        ],
    );
    write_bam(
        &b,
        "",
        &references(),
        &[
            make_record("b0", 0, 90),
            make_record("b1", 0, 6_500),
            make_record("b2", 1, 40),
        ],
    );
    write_bam(
        &c,
        "",
        &references(),
        &[make_record("c0", 0, 2_000), unmapped("c1")],
    );

    let mut multi =
        BamMultiReader::open(&[&a, &b, &c], MultiReaderOptions::default()).unwrap();
    assert_eq!(multi.reader_count(), 3);
    let merged = drain(&mut multi);
    assert_eq!(merged.len(), 9);

    // Mapped prefix is monotone in (ref_id, position).
    let mapped: Vec<(i32, i32)> = merged
        .iter()
        .filter(|al| al.ref_id >= 0)
        .map(|al| (al.ref_id, al.position))
        .collect();
    let mut sorted = mapped.clone();
    sorted.sort_unstable();
    assert_eq!(mapped, sorted);

    // Unmapped records trail everything.
    assert_eq!(merged[7].ref_id, -1);
    assert_eq!(merged[8].ref_id, -1);

    let names: Vec<&str> = merged.iter().map(|al| al.name.as_str()).collect();
    assert_eq!(names[..3], ["b0", "a0", "c0"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: equal keys drain in reader insertion order
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_merge_stability_on_ties() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.bam").to_str().unwrap().to_string();
    let second = dir.path().join("second.bam").to_str().unwrap().to_string();

    write_bam(
        &first,
        "",
        &references(),
        &[make_record("from_first", 0, 500)],
    );
    write_bam(
        &second,
        "",
        &references(),
        &[make_record("from_second", 0, 500)],
    );

    let mut multi =
        BamMultiReader::open(&[&first, &second], MultiReaderOptions::default()).unwrap();
    let merged = drain(&mut multi);
    let names: Vec<&str> = merged.iter().map(|al| al.name.as_str()).collect();
    assert_eq!(names, ["from_first", "from_second"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: ByReadName ordering
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_name_merge() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bam").to_str().unwrap().to_string();
    let b = dir.path().join("b.bam").to_str().unwrap().to_string();

    write_bam(
        &a,
        "",
        &references(),
        &[make_record("read_c", 0, 10), make_record("read_d", 0, 20)],
    );
    write_bam(
        &b,
        "",
        &references(),
        &[make_record("read_a", 0, 30), make_record("read_e", 0, 40)],
    );

    let mut multi = BamMultiReader::open(
        &[&a, &b],
        MultiReaderOptions {
            sort_order: SortOrder::ByReadName,
            ..Default::default()
        },
    )
    .unwrap();
    let names: Vec<String> = drain(&mut multi).into_iter().map(|al| al.name).collect();
    assert_eq!(names, ["read_a", "read_c", "read_d", "read_e"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: set_sort_order re-keys without losing pending records
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_switch_sort_order_midstream() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bam").to_str().unwrap().to_string();
    let b = dir.path().join("b.bam").to_str().unwrap().to_string();

    write_bam(
        &a,
        "",
        &references(),
        &[make_record("zzz", 0, 10), make_record("mmm", 0, 300)],
    );
    write_bam(
        &b,
        "",
        &references(),
        &[make_record("aaa", 0, 200), make_record("bbb", 0, 400)],
    );

    let mut multi =
        BamMultiReader::open(&[&a, &b], MultiReaderOptions::default()).unwrap();
    let mut al = BamAlignment::new();
    assert!(multi.next_alignment(&mut al).unwrap());
    assert_eq!(al.name, "zzz"); // position 10

    multi.set_sort_order(SortOrder::ByReadName);
    let rest: Vec<String> = drain(&mut multi).into_iter().map(|r| r.name).collect();
    assert_eq!(rest.len(), 3);
    let mut sorted = rest.clone();
    sorted.sort();
    assert_eq!(rest, sorted, "remaining records follow name order");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: region forwarding across all inputs
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_region_forwarding() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bam").to_str().unwrap().to_string();
    let b = dir.path().join("b.bam").to_str().unwrap().to_string();

    let a_records: Vec<BamAlignment> =
        (0..200).map(|i| make_record(&format!("a{i:03}"), 0, i * 90)).collect();
    // Input B only covers chrB; a chrA region is legitimately empty there.
    let b_records: Vec<BamAlignment> =
        (0..200).map(|i| make_record(&format!("b{i:03}"), 1, i * 90)).collect();
    write_bam(&a, "", &references(), &a_records);
    write_bam(&b, "", &references(), &b_records);

    let mut multi =
        BamMultiReader::open(&[&a, &b], MultiReaderOptions::default()).unwrap();
    multi.create_indexes(IndexKind::Bai).unwrap();

    multi.set_region(BamRegion::new(0, 1_000, 0, 2_000)).unwrap();
    let merged = drain(&mut multi);
    assert!(!merged.is_empty());
    for al in &merged {
        assert_eq!(al.ref_id, 0);
        assert!(al.end_position(false, true) >= 1_000);
        assert!(al.position <= 2_000);
        assert!(al.name.starts_with('a'), "chrB-only input contributes nothing");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: header merging
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_header_merge() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bam").to_str().unwrap().to_string();
    let b = dir.path().join("b.bam").to_str().unwrap().to_string();

    let header_a = "@HD\tVN:1.6\tSO:coordinate\n\
                    @SQ\tSN:chrA\tLN:500000\n\
                    @SQ\tSN:chrB\tLN:500000\n\
                    @RG\tID:rg1\tSM:sampleA\n\
                    @PG\tID:aligner\tPN:aln\n\
                    @CO\tfrom file A\n";
    let header_b = "@HD\tVN:1.5\n\
                    @SQ\tSN:chrA\tLN:500000\n\
                    @RG\tID:rg1\tSM:sampleA\n\
                    @RG\tID:rg2\tSM:sampleB\n\
                    @CO\tfrom file B\n";

    write_bam(&a, header_a, &references(), &[make_record("a0", 0, 1)]);
    write_bam(&b, header_b, &references(), &[make_record("b0", 0, 2)]);

    // Single input: verbatim passthrough.
    let solo = BamMultiReader::open(&[&a], MultiReaderOptions::default()).unwrap();
    assert_eq!(solo.header_text(), header_a);

    let multi = BamMultiReader::open(&[&a, &b], MultiReaderOptions::default()).unwrap();
    let merged = multi.header_text();
    let lines: Vec<&str> = merged.lines().collect();

    // First file's @HD and @SQ, verbatim and first.
    assert_eq!(lines[0], "@HD\tVN:1.6\tSO:coordinate");
    assert_eq!(lines[1], "@SQ\tSN:chrA\tLN:500000");
    assert_eq!(lines[2], "@SQ\tSN:chrB\tLN:500000");
    // @HD/@SQ from the second file are dropped.
    assert!(!merged.contains("VN:1.5"));

    // Read groups unioned by ID: rg1 once, rg2 present.
    assert_eq!(merged.matches("ID:rg1").count(), 1);
    assert_eq!(merged.matches("ID:rg2").count(), 1);

    // @PG and @CO survive from every file in encounter order.
    assert!(merged.contains("@PG\tID:aligner"));
    let co_a = merged.find("@CO\tfrom file A").unwrap();
    let co_b = merged.find("@CO\tfrom file B").unwrap();
    assert!(co_a < co_b);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: reference mismatch is fatal at open
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_reference_mismatch() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bam").to_str().unwrap().to_string();
    let b = dir.path().join("b.bam").to_str().unwrap().to_string();

    write_bam(&a, "", &references(), &[make_record("a0", 0, 1)]);
    let other_refs = vec![RefData::new("chrA", 500_000), RefData::new("chrC", 9_000)];
    write_bam(&b, "", &other_refs, &[make_record("b0", 0, 1)]);

    let err = BamMultiReader::open(&[&a, &b], MultiReaderOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        bam::BamError::Usage(bam::error::UsageError {
            kind: bam::error::UsageErrorKind::ReferenceMismatch,
        })
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: inputs with no alignments are excluded, not fatal
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_input_excluded() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bam").to_str().unwrap().to_string();
    let empty = dir.path().join("empty.bam").to_str().unwrap().to_string();

    write_bam(&a, "", &references(), &[make_record("a0", 0, 1), make_record("a1", 0, 2)]);
    write_bam(&empty, "", &references(), &[]);

    let mut multi =
        BamMultiReader::open(&[&a, &empty], MultiReaderOptions::default()).unwrap();
    assert_eq!(multi.reader_count(), 1);
    assert_eq!(drain(&mut multi).len(), 2);

    // An empty file as the only input is a failed open, not an empty
    // merge.
    let err = BamMultiReader::open(&[&empty], MultiReaderOptions::default()).unwrap_err();
    assert!(matches!(err, bam::BamError::Usage(_)), "got {err}");

    // A missing file still propagates.
    let missing = dir.path().join("nope.bam").to_str().unwrap().to_string();
    assert!(BamMultiReader::open(&[&missing], MultiReaderOptions::default()).is_err());
}
