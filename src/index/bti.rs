//! Block-interval index (`.bti`).
//!
//! Instead of genomic bins, this format records one entry per
//! `block_size` consecutive alignments (and at every reference change):
//! the block's maximum end position, the virtual offset of its first
//! record, and that record's start position. A region jump is a linear
//! scan of one reference's entries — cheap to build, adequate for
//! moderately sized references.
//!
//! The file is uncompressed: magic `"BTI\x01"`, u32 version, u32 block
//! size, i32 reference count, then per reference a u32 entry count and
//! the packed entries.

use crate::device::{IoDevice, Whence};
use crate::error::{BamError, IndexErrorKind, Result};
use crate::index::{read_i32, read_u32, read_u64, write_i32, write_u32, write_u64, IndexCacheMode};
use crate::reader::BamReader;
use crate::record::BamAlignment;
use crate::region::BamRegion;

pub const BTI_MAGIC: [u8; 4] = *b"BTI\x01";

/// Current on-disk version. Version 1 mishandled data near reference
/// ends and version 2 mishandled empty references; both are refused
/// with advice to rebuild.
pub const BTI_VERSION: u32 = 3;

/// Default alignments per index entry.
pub const BTI_DEFAULT_BLOCK_SIZE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    max_end_position: i32,
    start_offset: u64,
    start_position: i32,
}

#[derive(Debug, Default)]
struct ReferenceEntry {
    entries: Vec<IndexEntry>,
    has_alignments: bool,
    loaded: bool,
}

/// The `.bti` index for one BAM file.
#[derive(Debug)]
pub struct BtiIndex {
    block_size: u32,
    refs: Vec<ReferenceEntry>,
    cache_mode: IndexCacheMode,
    device: Option<IoDevice>,
    section_offsets: Vec<u64>,
}

impl BtiIndex {
    // ─────────────────────────────────────────────────────────────────────
    // Build
    // ─────────────────────────────────────────────────────────────────────

    /// Streams the reader's file once, emitting an entry per block of
    /// [`BTI_DEFAULT_BLOCK_SIZE`] records or at each reference change.
    pub fn build(reader: &mut BamReader) -> Result<BtiIndex> {
        reader.rewind_stream()?;

        let n_ref = reader.references().len();
        let mut refs: Vec<ReferenceEntry> = Vec::with_capacity(n_ref);
        for _ in 0..n_ref {
            refs.push(ReferenceEntry {
                loaded: true,
                ..Default::default()
            });
        }

        let block_size = BTI_DEFAULT_BLOCK_SIZE;
        let mut block_count: u32 = 0;
        let mut current_offset = reader.stream_tell();
        let mut block_ref_id: i32 = 0;
        let mut block_max_end: i32 = 0;
        let mut block_start_offset = current_offset;
        let mut block_start_position: i32 = -1;

        let mut al = BamAlignment::new();
        while reader.load_next_core(&mut al)? {
            // Reference change closes the open block before the new
            // record is counted into a fresh one.
            if block_count > 0 && al.ref_id != block_ref_id {
                save_entry(
                    &mut refs,
                    block_ref_id,
                    IndexEntry {
                        max_end_position: block_max_end,
                        start_offset: block_start_offset,
                        start_position: block_start_position,
                    },
                );
                block_count = 0;
                block_max_end = al.end_position(false, true);
                block_start_offset = current_offset;
            }

            if block_count == 0 {
                block_ref_id = al.ref_id;
                block_start_position = al.position;
            }
            block_count += 1;

            let end = al.end_position(false, true);
            if end > block_max_end {
                block_max_end = end;
            }

            if block_count == block_size {
                save_entry(
                    &mut refs,
                    block_ref_id,
                    IndexEntry {
                        max_end_position: block_max_end,
                        start_offset: block_start_offset,
                        start_position: block_start_position,
                    },
                );
                block_start_offset = reader.stream_tell();
                block_count = 0;
            }

            // Offset of the record about to be read on the next
            // iteration; whether it opens a new block is unknown until
            // it is decoded.
            current_offset = reader.stream_tell();
        }

        if block_count > 0 {
            save_entry(
                &mut refs,
                block_ref_id,
                IndexEntry {
                    max_end_position: block_max_end,
                    start_offset: block_start_offset,
                    start_position: block_start_position,
                },
            );
        }

        reader.rewind_stream()?;
        Ok(BtiIndex {
            block_size,
            refs,
            cache_mode: IndexCacheMode::Full,
            device: None,
            section_offsets: Vec::new(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // File IO
    // ─────────────────────────────────────────────────────────────────────

    pub fn load(path: &str, cache_mode: IndexCacheMode) -> Result<BtiIndex> {
        let mut device = IoDevice::open_read(path)?;

        let mut magic = [0u8; 4];
        device.read_exact(&mut magic)?;
        if magic != BTI_MAGIC {
            return Err(BamError::index(IndexErrorKind::BadMagic));
        }

        let version = read_u32(&mut device)?;
        if version != BTI_VERSION {
            return Err(BamError::index(IndexErrorKind::StaleVersion));
        }

        let block_size = read_u32(&mut device)?;
        let n_ref = read_i32(&mut device)?;
        if n_ref < 0 {
            return Err(BamError::index(IndexErrorKind::Corrupt));
        }

        let mut refs = Vec::with_capacity(n_ref as usize);
        let mut section_offsets = Vec::with_capacity(n_ref as usize);
        for r in 0..n_ref as usize {
            section_offsets.push(device.tell()?);
            let save = match cache_mode {
                IndexCacheMode::Full => true,
                IndexCacheMode::Limited => r == 0,
                IndexCacheMode::None => false,
            };
            refs.push(read_reference(&mut device, save)?);
        }

        Ok(BtiIndex {
            block_size,
            refs,
            cache_mode,
            device: Some(device),
            section_offsets,
        })
    }

    pub fn write(&mut self, path: &str) -> Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&BTI_MAGIC);
        write_u32(&mut out, BTI_VERSION);
        write_u32(&mut out, self.block_size);
        write_i32(&mut out, self.refs.len() as i32);
        for r in 0..self.refs.len() {
            self.ensure_loaded(r)?;
            let entry = &self.refs[r];
            write_u32(&mut out, entry.entries.len() as u32);
            for e in &entry.entries {
                write_i32(&mut out, e.max_end_position);
                write_u64(&mut out, e.start_offset);
                write_i32(&mut out, e.start_position);
            }
        }

        let mut device = IoDevice::open_write(path)?;
        device.write_all(&out)?;
        device.flush()
    }

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
                    r.entries.clear();
                    r.loaded = false;
                    r.has_alignments = has;
                }
            }
        }
        Ok(())
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

    /// The virtual offset to seek for `region`, or None when no block on
    /// the left-bound reference can reach the region. The target is the
    /// entry preceding the first block whose maximum end position
    /// reaches the region — conservative by one block, so the caller's
    /// overlap filter sees every candidate. The right bound is ignored;
    /// filtering handles it downstream.
    pub fn offset_for_region(&mut self, region: &BamRegion) -> Result<Option<u64>> {
        let ref_id = region.left_ref_id as usize;
        if ref_id >= self.refs.len() {
            return Err(BamError::index(IndexErrorKind::Corrupt));
        }
        self.ensure_loaded(ref_id)?;

        let entries = &self.refs[ref_id].entries;
        if entries.is_empty() {
            self.after_query(ref_id);
            return Ok(None);
        }

        let mut offset = entries[0].start_offset;
        let mut found = false;
        for e in entries {
            if e.max_end_position >= region.left_position {
                found = true;
                break;
            }
            offset = e.start_offset;
        }

        self.after_query(ref_id);
        Ok(if found { Some(offset) } else { None })
    }

    fn after_query(&mut self, ref_id: usize) {
        if self.cache_mode == IndexCacheMode::None && self.device.is_some() {
            let has = self.refs[ref_id].has_alignments;
            self.refs[ref_id].entries.clear();
            self.refs[ref_id].loaded = false;
            self.refs[ref_id].has_alignments = has;
        }
    }

    /// Seeks the reader for `region`. Returns false when the region has
    /// no alignments.
    pub fn jump(&mut self, reader: &mut BamReader, region: &BamRegion) -> Result<bool> {
        match self.offset_for_region(region)? {
            Some(offset) => {
                reader.stream_seek(offset)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn save_entry(refs: &mut [ReferenceEntry], ref_id: i32, entry: IndexEntry) {
    if ref_id < 0 || ref_id as usize >= refs.len() {
        return; // unmapped tail records are not indexed
    }
    let r = &mut refs[ref_id as usize];
    r.entries.push(entry);
    r.has_alignments = true;
}

fn read_reference(device: &mut IoDevice, save: bool) -> Result<ReferenceEntry> {
    let mut entry = ReferenceEntry::default();
    let n_offsets = read_u32(device)?;
    entry.has_alignments = n_offsets != 0;
    if save {
        entry.entries.reserve(n_offsets as usize);
        for _ in 0..n_offsets {
            let max_end_position = read_i32(device)?;
            let start_offset = read_u64(device)?;
            let start_position = read_i32(device)?;
            entry.entries.push(IndexEntry {
                max_end_position,
                start_offset,
                start_position,
            });
        }
        entry.loaded = true;
    } else {
        device.seek(Whence::Current(n_offsets as i64 * 16))?;
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with_entries(entries: Vec<(i32, u64, i32)>) -> BtiIndex {
        BtiIndex {
            block_size: BTI_DEFAULT_BLOCK_SIZE,
            refs: vec![ReferenceEntry {
                has_alignments: !entries.is_empty(),
                loaded: true,
                entries: entries
                    .into_iter()
                    .map(|(max_end, off, start)| IndexEntry {
                        max_end_position: max_end,
                        start_offset: off,
                        start_position: start,
                    })
                    .collect(),
            }],
            cache_mode: IndexCacheMode::Full,
            device: None,
            section_offsets: Vec::new(),
        }
    }

    #[test]
    fn offset_scan_picks_preceding_block() {
        let mut index = index_with_entries(vec![
            (1_000, 0x10, 0),
            (2_000, 0x20, 900),
            (3_000, 0x30, 1900),
        ]);
        // First block already reaches position 500.
        let r = BamRegion::from(0, 500);
        assert_eq!(index.offset_for_region(&r).unwrap(), Some(0x10));

        // Position 2_500 is first reached by block 2; seek target is the
        // preceding block's offset.
        let r = BamRegion::from(0, 2_500);
        assert_eq!(index.offset_for_region(&r).unwrap(), Some(0x20));

        // Nothing reaches position 5_000.
        let r = BamRegion::from(0, 5_000);
        assert_eq!(index.offset_for_region(&r).unwrap(), None);
    }

    #[test]
    fn empty_reference_has_no_offset() {
        let mut index = index_with_entries(Vec::new());
        let r = BamRegion::from(0, 0);
        assert_eq!(index.offset_for_region(&r).unwrap(), None);
        assert!(!index.has_alignments(0));
    }
}
