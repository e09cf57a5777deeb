//! E2E Test Suite 02: alignment record codec
//!
//! Writes records through the full Writer → BGZF → Reader pipeline and
//! checks field-for-field and byte-for-byte round-trips, CIGAR
//! decoding, end-position math, lazy char-data materialization, and
//! tag survival on the wire.

use bam::index::bai::BaiIndex;
use bam::record::codec::encode_record;
use bam::{
    BamAlignment, BamReader, BamWriter, CigarOp, RefData, TagValue, WriterOptions,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn references() -> Vec<RefData> {
    vec![RefData::new("seq1", 1575), RefData::new("seq2", 1584)]
}

fn cigar(ops: &[(char, u32)]) -> Vec<CigarOp> {
    ops.iter().map(|&(op, len)| CigarOp::new(op, len)).collect()
}

fn make_record(name: &str, ref_id: i32, position: i32, bases: &str, ops: &[(char, u32)]) -> BamAlignment {
    let mut al = BamAlignment::new();
    al.name = name.to_string();
    al.ref_id = ref_id;
    al.position = position;
    al.map_quality = 37;
    al.cigar = cigar(ops);
    al.query_bases = bases.to_string();
    al.qualities = "I".repeat(bases.len());
    al.length = bases.len() as i32;
    al.bin = BaiIndex::bin_for_interval(position, al.end_position(false, true).max(position + 1));
    al.mate_ref_id = -1;
    al.mate_position = -1;
    al
}

fn roundtrip(records: &[BamAlignment]) -> (TempDir, String, Vec<BamAlignment>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.bam").to_str().unwrap().to_string();

    let mut writer =
        BamWriter::create(&path, "@HD\tVN:1.6\n", &references(), WriterOptions::default()).unwrap();
    for r in records {
        writer.save_alignment(r).unwrap();
    }
    writer.close().unwrap();

    let mut reader = BamReader::open(&path).unwrap();
    let mut out = Vec::new();
    let mut al = BamAlignment::new();
    while reader.next_alignment(&mut al).unwrap() {
        out.push(al.clone());
    }
    (dir, path, out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: CIGAR "8M2I4M1D3M" decodes op-for-op; end position = 116
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_cigar_decode_and_end_position() {
    let bases = "ACGTACGTACGTACGTA"; // 17 query bases: 8M + 2I + 4M + 3M
    let rec = make_record(
        "cigar_read",
        0,
        100,
        bases,
        &[('M', 8), ('I', 2), ('M', 4), ('D', 1), ('M', 3)],
    );
    let (_dir, _path, decoded) = roundtrip(&[rec]);
    assert_eq!(decoded.len(), 1);
    let al = &decoded[0];

    let ops: Vec<(char, u32)> = al.cigar.iter().map(|c| (c.op, c.len)).collect();
    assert_eq!(ops, vec![('M', 8), ('I', 2), ('M', 4), ('D', 1), ('M', 3)]);
    assert_eq!(al.end_position(false, true), 116);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: field-for-field round-trip, including char data
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_fields_roundtrip() {
    let mut rec = make_record("roundtrip_read", 1, 250, "ACGTNACGT", &[('M', 9)]);
    rec.flag = 0x0063;
    rec.mate_ref_id = 1;
    rec.mate_position = 400;
    rec.insert_size = 159;
    rec.qualities = "IJKLMNOPQ".to_string();

    let (_dir, _path, decoded) = roundtrip(&[rec.clone()]);
    let al = &decoded[0];

    assert_eq!(al.name, rec.name);
    assert_eq!(al.ref_id, rec.ref_id);
    assert_eq!(al.position, rec.position);
    assert_eq!(al.bin, rec.bin);
    assert_eq!(al.map_quality, rec.map_quality);
    assert_eq!(al.flag, rec.flag);
    assert_eq!(al.cigar, rec.cigar);
    assert_eq!(al.query_bases, rec.query_bases);
    assert_eq!(al.qualities, rec.qualities);
    assert_eq!(al.mate_ref_id, rec.mate_ref_id);
    assert_eq!(al.mate_position, rec.mate_position);
    assert_eq!(al.insert_size, rec.insert_size);
    assert_eq!(al.length, rec.length);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: wire bytes are identical after decode + re-encode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_wire_bytes_roundtrip() {
    let mut rec = make_record("wire_read", 0, 500, "TTACGGA", &[('S', 2), ('M', 5)]);
    rec.add_tag("NM", &TagValue::Int32(3)).unwrap();
    rec.add_tag("RG", &TagValue::String("sample1".into())).unwrap();

    let mut original_wire = Vec::new();
    encode_record(&rec, &mut original_wire).unwrap();

    // Decode through the file pipeline, then re-encode the core-only
    // record that comes back.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wire.bam").to_str().unwrap().to_string();
    let mut writer = BamWriter::create(&path, "", &references(), WriterOptions::default()).unwrap();
    writer.save_alignment(&rec).unwrap();
    writer.close().unwrap();

    let mut reader = BamReader::open(&path).unwrap();
    let mut al = BamAlignment::new();
    assert!(reader.next_alignment_core(&mut al).unwrap());
    assert!(al.is_core_only());

    let mut reencoded = Vec::new();
    encode_record(&al, &mut reencoded).unwrap();
    assert_eq!(reencoded, original_wire);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: tags survive the wire (NM:i, RG:Z, XF:B:i)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_tags_roundtrip_on_disk() {
    let mut rec = make_record("tagged_read", 0, 10, "ACGT", &[('M', 4)]);
    rec.add_tag("NM", &TagValue::Int32(3)).unwrap();
    rec.add_tag("RG", &TagValue::String("sample1".into())).unwrap();
    rec.add_tag("XF", &TagValue::ArrayInt32(vec![10, 20, 30])).unwrap();

    let (_dir, _path, decoded) = roundtrip(&[rec.clone()]);
    let al = &decoded[0];

    assert_eq!(al.tag_data, rec.tag_data);
    assert_eq!(al.int_tag("NM").unwrap(), Some(3));
    assert_eq!(al.string_tag("RG").unwrap(), Some("sample1".to_string()));
    assert_eq!(al.int_array_tag("XF").unwrap(), Some(vec![10, 20, 30]));
    assert_eq!(al.tag_type("NM").unwrap(), Some('i'));
    assert_eq!(al.tag_type("XF").unwrap(), Some('B'));
    assert_eq!(al.edit_distance().unwrap(), Some(3));
    assert_eq!(al.read_group().unwrap(), Some("sample1".to_string()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: core-only records defer char data until asked
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_core_only_materializes_on_demand() {
    let rec = make_record("lazy_read", 0, 300, "ACGTACGT", &[('M', 4), ('D', 2), ('M', 4)]);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lazy.bam").to_str().unwrap().to_string();
    let mut writer = BamWriter::create(&path, "", &references(), WriterOptions::default()).unwrap();
    writer.save_alignment(&rec).unwrap();
    writer.close().unwrap();

    let mut reader = BamReader::open(&path).unwrap();
    let mut al = BamAlignment::new();
    assert!(reader.next_alignment_core(&mut al).unwrap());

    // Core fields live; char fields empty until materialized.
    assert!(al.is_core_only());
    assert_eq!(al.position, 300);
    assert_eq!(al.cigar.len(), 3);
    assert!(al.name.is_empty());
    assert!(al.query_bases.is_empty());

    al.build_char_data().unwrap();
    assert!(!al.is_core_only());
    assert_eq!(al.name, "lazy_read");
    assert_eq!(al.query_bases, "ACGTACGT");
    // M×4 emits, D×2 writes gaps, M×4 emits.
    assert_eq!(al.aligned_bases, "ACGT--ACGT");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: missing-quality sentinel round-trips bit-for-bit
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_qualities_sentinel() {
    let mut rec = make_record("noqual_read", 0, 50, "ACGT", &[('M', 4)]);
    rec.qualities = String::new(); // encoder fills 0xFF

    let (_dir, _path, decoded) = roundtrip(&[rec]);
    let al = &decoded[0];

    // 0xFF wraps through the +33 conversion to 0x20.
    assert_eq!(al.qualities, "\u{20}\u{20}\u{20}\u{20}");

    // And encodes straight back to 0xFF.
    let mut wire = Vec::new();
    encode_record(al, &mut wire).unwrap();
    let qual_offset = wire.len() - 4; // no tags: qualities are the tail
    assert_eq!(&wire[qual_offset..], &[0xff, 0xff, 0xff, 0xff]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: unmapped records — end position equals position
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unmapped_record() {
    let mut rec = make_record("unmapped_read", 0, 77, "ACGT", &[]);
    rec.ref_id = -1;
    rec.position = 77;
    rec.set_is_mapped(false);
    rec.bin = 0;

    let (_dir, _path, decoded) = roundtrip(&[rec]);
    let al = &decoded[0];
    assert!(!al.is_mapped());
    assert_eq!(al.end_position(false, true), 77);
    assert_eq!(al.end_position(true, false), 77);
}
