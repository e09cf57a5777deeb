//! Standard binning + linear index (`.bai`).
//!
//! Per reference, the index keeps a map from bin id to the chunks of
//! virtual-offset space holding that bin's records, plus a linear
//! vector with one slot per 16 kb genomic window recording the smallest
//! virtual offset of any record overlapping that window.
//!
//! The bin hierarchy tiles a 512 Mb reference in six levels: bin 0
//! spans everything; bins 1–8 span 64 Mb each; 9–72 span 8 Mb; 73–584
//! span 1 Mb; 585–4680 span 128 kb; 4681–37449 span 16 kb.

use std::collections::BTreeMap;

use crate::device::{IoDevice, Whence};
use crate::error::{BamError, IndexErrorKind, Result};
use crate::header::RefData;
use crate::index::{
    read_u32, read_u64, write_u32, write_u64, Chunk, IndexCacheMode,
};
use crate::reader::BamReader;
use crate::record::BamAlignment;
use crate::region::BamRegion;

pub const BAI_MAGIC: [u8; 4] = *b"BAI\x01";

/// Total bin count; bin ids are always below this.
pub const MAX_BIN: u32 = 37450;

/// Linear-index granularity: one slot per 2^14 bases.
const LINEAR_SHIFT: i32 = 14;

/// Bins at or above this id span a single 16 kb window.
const FINE_BIN_START: u16 = 4681;

#[derive(Debug, Default)]
struct ReferenceIndex {
    bins: BTreeMap<u32, Vec<Chunk>>,
    offsets: Vec<u64>,
    has_alignments: bool,
    loaded: bool,
}

impl ReferenceIndex {
    fn clear_data(&mut self) {
        self.bins.clear();
        self.offsets.clear();
        self.loaded = false;
    }
}

/// The `.bai` index for one BAM file.
#[derive(Debug)]
pub struct BaiIndex {
    refs: Vec<ReferenceIndex>,
    cache_mode: IndexCacheMode,
    /// Backing index file, kept open for partial reloads under the
    /// Limited / None cache modes. Absent for freshly built indexes.
    device: Option<IoDevice>,
    /// Byte offset of each reference's section in the index file.
    section_offsets: Vec<u64>,
}

impl BaiIndex {
    // ─────────────────────────────────────────────────────────────────────
    // Bin math
    // ─────────────────────────────────────────────────────────────────────

    /// The smallest bin fully containing `[begin, end)` — the bin value
    /// a record covering that interval carries on disk.
    pub fn bin_for_interval(begin: i32, end: i32) -> u16 {
        let begin = begin.max(0);
        let end = (end - 1).max(begin);
        if begin >> 14 == end >> 14 {
            return (4681 + (begin >> 14)) as u16;
        }
        if begin >> 17 == end >> 17 {
            return (585 + (begin >> 17)) as u16;
        }
        if begin >> 20 == end >> 20 {
            return (73 + (begin >> 20)) as u16;
        }
        if begin >> 23 == end >> 23 {
            return (9 + (begin >> 23)) as u16;
        }
        if begin >> 26 == end >> 26 {
            return (1 + (begin >> 26)) as u16;
        }
        0
    }

    /// All bins whose window can overlap `[begin, end]` (positions
    /// inclusive). Bin 0 is always a candidate.
    pub fn bins_for_region(begin: u32, end: u32) -> Vec<u32> {
        let mut bins = Vec::with_capacity(MAX_BIN as usize / 512);
        bins.push(0);
        for k in (1 + (begin >> 26))..=(1 + (end >> 26)) {
            bins.push(k);
        }
        for k in (9 + (begin >> 23))..=(9 + (end >> 23)) {
            bins.push(k);
        }
        for k in (73 + (begin >> 20))..=(73 + (end >> 20)) {
            bins.push(k);
        }
        for k in (585 + (begin >> 17))..=(585 + (end >> 17)) {
            bins.push(k);
        }
        for k in (4681 + (begin >> 14))..=(4681 + (end >> 14)) {
            bins.push(k);
        }
        bins
    }

    // ─────────────────────────────────────────────────────────────────────
    // Build
    // ─────────────────────────────────────────────────────────────────────

    /// Builds index data with a single pass over the reader's file.
    /// Records must be coordinate-sorted within each reference;
    /// violations fail with `UnsortedInput`. Indexing stops at the
    /// first unmapped (ref id −1) record, which sorted files place last.
    pub fn build(reader: &mut BamReader) -> Result<BaiIndex> {
        reader.rewind_stream()?;

        let n_ref = reader.references().len();
        let mut refs: Vec<ReferenceIndex> = Vec::with_capacity(n_ref);
        for _ in 0..n_ref {
            refs.push(ReferenceIndex {
                loaded: true,
                ..Default::default()
            });
        }

        let mut save_bin: Option<u32> = None;
        let mut last_bin: Option<u32> = None;
        let mut save_ref_id: i32 = -1;
        let mut last_ref_id: Option<i32> = None;
        let mut save_offset = reader.stream_tell();
        let mut last_offset = save_offset;
        let mut last_coordinate: i32 = 0;

        let mut al = BamAlignment::new();
        while reader.load_next_core(&mut al)? {
            if al.ref_id >= n_ref as i32 {
                return Err(BamError::index(IndexErrorKind::Corrupt));
            }
            if last_ref_id != Some(al.ref_id) {
                last_ref_id = Some(al.ref_id);
                last_bin = None;
            } else if last_coordinate > al.position {
                return Err(BamError::index(IndexErrorKind::UnsortedInput));
            }

            // Records in fine (16 kb) bins contribute linear offsets.
            if al.ref_id >= 0 && al.bin < FINE_BIN_START {
                save_linear_offset(&mut refs[al.ref_id as usize].offsets, &al, last_offset);
            }

            if last_bin != Some(al.bin as u32) {
                // Flush the chunk accumulated for the previous bin run.
                if let Some(bin) = save_bin {
                    refs[save_ref_id as usize]
                        .bins
                        .entry(bin)
                        .or_default()
                        .push(Chunk::new(save_offset, last_offset));
                }
                save_offset = last_offset;
                save_bin = Some(al.bin as u32);
                last_bin = save_bin;
                save_ref_id = al.ref_id;
                if save_ref_id < 0 {
                    break;
                }
            }

            last_offset = reader.stream_tell();
            last_coordinate = al.position;
        }

        // Trailing bin run.
        if save_ref_id >= 0 {
            if let Some(bin) = save_bin {
                refs[save_ref_id as usize]
                    .bins
                    .entry(bin)
                    .or_default()
                    .push(Chunk::new(save_offset, last_offset));
            }
        }

        for r in &mut refs {
            merge_chunks(&mut r.bins);
            r.offsets.sort_unstable();
            r.has_alignments = !r.bins.is_empty();
        }

        reader.rewind_stream()?;
        Ok(BaiIndex {
            refs,
            cache_mode: IndexCacheMode::Full,
            device: None,
            section_offsets: Vec::new(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // File IO
    // ─────────────────────────────────────────────────────────────────────

    pub fn load(path: &str, cache_mode: IndexCacheMode) -> Result<BaiIndex> {
        let mut device = IoDevice::open_read(path)?;

        let mut magic = [0u8; 4];
        device.read_exact(&mut magic)?;
        if magic != BAI_MAGIC {
            return Err(BamError::index(IndexErrorKind::BadMagic));
        }

        let n_ref = read_u32(&mut device)? as usize;
        let mut refs = Vec::with_capacity(n_ref);
        let mut section_offsets = Vec::with_capacity(n_ref);
        for r in 0..n_ref {
            section_offsets.push(device.tell()?);
            // Under Limited caching the first reference stays resident;
            // the rest are scanned for their section offsets and
            // has-alignments flags only.
            let save = match cache_mode {
                IndexCacheMode::Full => true,
                IndexCacheMode::Limited => r == 0,
                IndexCacheMode::None => false,
            };
            refs.push(read_reference(&mut device, save)?);
        }

        Ok(BaiIndex {
            refs,
            cache_mode,
            device: Some(device),
            section_offsets,
        })
    }

    pub fn write(&mut self, path: &str) -> Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&BAI_MAGIC);
        write_u32(&mut out, self.refs.len() as u32);
        for r in 0..self.refs.len() {
            self.ensure_loaded(r)?;
            let entry = &self.refs[r];
            write_u32(&mut out, entry.bins.len() as u32);
            for (&bin_id, chunks) in &entry.bins {
                write_u32(&mut out, bin_id);
                write_u32(&mut out, chunks.len() as u32);
                for c in chunks {
                    write_u64(&mut out, c.start);
                    write_u64(&mut out, c.end);
                }
            }
            write_u32(&mut out, entry.offsets.len() as u32);
            for &off in &entry.offsets {
                write_u64(&mut out, off);
            }
        }

        let mut device = IoDevice::open_write(path)?;
        device.write_all(&out)?;
        device.flush()
    }

    /// Re-reads one reference's section from the backing file when it is
    /// not resident, evicting others under Limited caching.
    fn ensure_loaded(&mut self, ref_id: usize) -> Result<()> {
        if self.refs[ref_id].loaded {
            return Ok(());
        }
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| BamError::index(IndexErrorKind::Corrupt))?;
        device.seek(Whence::Start(self.section_offsets[ref_id]))?;
        self.refs[ref_id] = read_reference(device, true)?;

        if self.cache_mode == IndexCacheMode::Limited {
            for (i, r) in self.refs.iter_mut().enumerate() {
                if i != ref_id && r.loaded {
                    let has = r.has_alignments;
                    r.clear_data();
                    r.has_alignments = has;
                }
            }
        }
        Ok(())
    }

    fn after_query(&mut self, ref_id: usize) {
        if self.cache_mode == IndexCacheMode::None && self.device.is_some() {
            let has = self.refs[ref_id].has_alignments;
            self.refs[ref_id].clear_data();
            self.refs[ref_id].has_alignments = has;
        }
    }

    pub fn set_cache_mode(&mut self, mode: IndexCacheMode) {
        self.cache_mode = mode;
    }

    pub fn has_alignments(&self, ref_id: i32) -> bool {
        self.refs
            .get(ref_id as usize)
            .map(|r| r.has_alignments)
            .unwrap_or(false)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Region queries
    // ─────────────────────────────────────────────────────────────────────

    /// Sorted candidate chunk-start offsets for `region`: chunks of
    /// every candidate bin whose end lies past the linear-index floor
    /// for the region's left edge.
    pub fn offsets_for_region(
        &mut self,
        region: &BamRegion,
        references: &[RefData],
    ) -> Result<Vec<u64>> {
        let ref_id = region.left_ref_id as usize;
        if ref_id >= self.refs.len() {
            return Err(BamError::index(IndexErrorKind::Corrupt));
        }
        self.ensure_loaded(ref_id)?;

        let begin = region.left_position.max(0) as u32;
        let end = if region.is_right_bound_specified() && region.left_ref_id == region.right_ref_id
        {
            region.right_position as u32
        } else {
            (references[ref_id].length - 1).max(region.left_position) as u32
        };
        let bins = Self::bins_for_region(begin, end);

        let entry = &self.refs[ref_id];
        let slot = (region.left_position >> LINEAR_SHIFT) as usize;
        let min_offset = entry.offsets.get(slot).copied().unwrap_or(0);

        let mut starts = Vec::new();
        for bin in bins {
            if let Some(chunks) = entry.bins.get(&bin) {
                for c in chunks {
                    if c.end > min_offset {
                        starts.push(c.start);
                    }
                }
            }
        }
        starts.sort_unstable();

        self.after_query(ref_id);
        Ok(starts)
    }

    /// Probes the candidate offsets in order and leaves the reader
    /// positioned to cover the region, stepping one candidate back
    /// before the final seek so alignments straddling a chunk boundary
    /// are not skipped. Returns false when the region has no
    /// alignments.
    pub fn jump(&mut self, reader: &mut BamReader, region: &BamRegion) -> Result<bool> {
        let offsets = {
            let references = reader.references().to_vec();
            self.offsets_for_region(region, &references)?
        };
        if offsets.is_empty() {
            return Ok(false);
        }

        let mut al = BamAlignment::new();
        for (i, &offset) in offsets.iter().enumerate() {
            reader.stream_seek(offset)?;
            if !reader.load_next_core(&mut al)? {
                continue;
            }
            let overlaps = (al.ref_id == region.left_ref_id
                && al.position + al.length > region.left_position)
                || al.ref_id > region.left_ref_id;
            if overlaps {
                let target = if i > 0 { offsets[i - 1] } else { offset };
                reader.stream_seek(target)?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Marks the linear-index slots `(pos >> 14) + 1 ..= (end − 1) >> 14`
/// with the record's starting virtual offset, first writer wins.
fn save_linear_offset(offsets: &mut Vec<u64>, al: &BamAlignment, record_offset: u64) {
    let begin_slot = al.position >> LINEAR_SHIFT;
    let end_slot = (al.end_position(false, true) - 1) >> LINEAR_SHIFT;
    if end_slot < 0 {
        return;
    }
    if offsets.len() < (end_slot + 1) as usize {
        offsets.resize((end_slot + 1) as usize, 0);
    }
    for i in (begin_slot + 1)..=end_slot {
        if offsets[i as usize] == 0 {
            offsets[i as usize] = record_offset;
        }
    }
}

/// Merges adjacent chunks that end and start within the same compressed
/// block.
fn merge_chunks(bins: &mut BTreeMap<u32, Vec<Chunk>>) {
    for chunks in bins.values_mut() {
        if chunks.is_empty() {
            continue;
        }
        let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
        merged.push(chunks[0]);
        for c in &chunks[1..] {
            let current = merged.last_mut().expect("merged is non-empty");
            if current.end >> 16 == c.start >> 16 {
                current.end = c.end;
            } else {
                merged.push(*c);
            }
        }
        *chunks = merged;
    }
}

/// Parses one reference's section; data is retained only when `save`.
fn read_reference(device: &mut IoDevice, save: bool) -> Result<ReferenceIndex> {
    let mut entry = ReferenceIndex::default();

    let n_bin = read_u32(device)?;
    entry.has_alignments = n_bin != 0;
    for _ in 0..n_bin {
        let bin_id = read_u32(device)?;
        let n_chunk = read_u32(device)?;
        if save {
            let mut chunks = Vec::with_capacity(n_chunk as usize);
            for _ in 0..n_chunk {
                let start = read_u64(device)?;
                let end = read_u64(device)?;
                chunks.push(Chunk::new(start, end));
            }
            chunks.sort_unstable_by_key(|c| c.start);
            entry.bins.insert(bin_id, chunks);
        } else {
            device.seek(Whence::Current(n_chunk as i64 * 16))?;
        }
    }

    let n_intv = read_u32(device)?;
    if save {
        entry.offsets.reserve(n_intv as usize);
        for _ in 0..n_intv {
            entry.offsets.push(read_u64(device)?);
        }
        entry.offsets.sort_unstable();
        entry.loaded = true;
    } else {
        device.seek(Whence::Current(n_intv as i64 * 8))?;
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_bin_is_in_its_own_candidate_set() {
        for (begin, end) in [(0, 100), (16_000, 17_000), (100_000, 400_000), (0, 1 << 28)] {
            let bin = BaiIndex::bin_for_interval(begin, end) as u32;
            let bins = BaiIndex::bins_for_region(begin as u32, (end - 1) as u32);
            assert!(bins.contains(&bin), "bin {bin} for [{begin}, {end})");
        }
    }

    #[test]
    fn bin_for_interval_levels() {
        // Within one 16 kb window: finest level.
        assert_eq!(BaiIndex::bin_for_interval(0, 16_384), 4681);
        assert_eq!(BaiIndex::bin_for_interval(16_384, 16_400), 4682);
        // Spans two 16 kb windows but one 128 kb window.
        assert_eq!(BaiIndex::bin_for_interval(16_000, 17_000), 585);
        // Full reference span only fits bin 0.
        assert_eq!(BaiIndex::bin_for_interval(0, 1 << 29), 0);
    }

    #[test]
    fn bins_for_smallest_window() {
        // [0, 16384) touches exactly one bin at every level.
        let bins = BaiIndex::bins_for_region(0, 16383);
        assert_eq!(bins, vec![0, 1, 9, 73, 585, 4681]);
    }

    #[test]
    fn bins_for_full_reference() {
        // The full 512 Mb span covers the entire lineage at each level.
        let bins = BaiIndex::bins_for_region(0, (512 << 20) - 1);
        assert_eq!(bins[0], 0);
        assert!(bins.contains(&1) && bins.contains(&8));
        assert!(bins.contains(&9) && bins.contains(&72));
        assert!(bins.contains(&73) && bins.contains(&584));
        assert!(bins.contains(&585) && bins.contains(&4680));
        assert!(bins.contains(&4681) && bins.contains(&37448));
        // One bin per window per level: 1 + 8 + 64 + 512 + 4096 + 32768.
        assert_eq!(bins.len(), 37449);
        assert!(bins.iter().all(|&b| b < MAX_BIN));
    }

    #[test]
    fn bins_cover_every_overlapping_window() {
        // Every bin whose 2^k window overlaps [b, e] must be present.
        let (b, e) = (100_000u32, 300_000u32);
        let bins = BaiIndex::bins_for_region(b, e);
        for (base, shift) in [(1u32, 26), (9, 23), (73, 20), (585, 17), (4681, 14)] {
            for k in (base + (b >> shift))..=(base + (e >> shift)) {
                assert!(bins.contains(&k), "missing bin {k}");
            }
        }
    }

    #[test]
    fn linear_offsets_fill_following_slots() {
        let mut offsets = Vec::new();
        let mut al = BamAlignment::new();
        al.ref_id = 0;
        al.position = 10_000;
        al.cigar = vec![crate::record::CigarOp::new('M', 40_000)];
        save_linear_offset(&mut offsets, &al, 0x77);
        // Record spans windows 0..=3; slots 1..=3 take its offset.
        assert_eq!(offsets, vec![0, 0x77, 0x77, 0x77]);

        // First writer wins.
        al.position = 20_000;
        save_linear_offset(&mut offsets, &al, 0x99);
        assert_eq!(offsets[1], 0x77);
        assert_eq!(offsets[2], 0x77);
    }

    #[test]
    fn linear_offset_degenerate_record() {
        // Empty CIGAR: end == pos, no slots to mark, no panic at pos 0.
        let mut offsets = Vec::new();
        let mut al = BamAlignment::new();
        al.ref_id = 0;
        al.position = 0;
        save_linear_offset(&mut offsets, &al, 0x1);
        assert!(offsets.is_empty());
    }

    #[test]
    fn chunk_merge_joins_same_block_neighbors() {
        let mut bins = BTreeMap::new();
        bins.insert(
            4681u32,
            vec![
                Chunk::new(0x10_0000, 0x10_8000),
                Chunk::new(0x10_9000, 0x11_0000), // same block as previous end
                Chunk::new(0x30_0000, 0x31_0000),
            ],
        );
        merge_chunks(&mut bins);
        let merged = &bins[&4681];
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], Chunk::new(0x10_0000, 0x11_0000));
        assert_eq!(merged[1], Chunk::new(0x30_0000, 0x31_0000));
    }
}
