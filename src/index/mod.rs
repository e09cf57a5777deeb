//! Range indices for BAM files.
//!
//! Two formats are supported behind one variant enum:
//!
//! - [`BaiIndex`] — the standard binning + linear index (`.bai`),
//!   interoperable with the published SAM/BAM index format.
//! - [`BtiIndex`] — the block-interval index (`.bti`): one entry per
//!   fixed-size run of alignments, cheap to build and scan.
//!
//! Index files are **uncompressed**; they are read through a raw
//! [`IoDevice`](crate::device::IoDevice), not BGZF. An index is owned by
//! exactly one reader.

pub mod bai;
pub mod bti;

pub use bai::BaiIndex;
pub use bti::BtiIndex;

use crate::error::Result;
use crate::reader::BamReader;
use crate::region::BamRegion;

/// Which index format to build or load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexKind {
    /// Standard binning index, `.bai`.
    #[default]
    Bai,
    /// Block-interval index, `.bti`.
    Bti,
}

impl IndexKind {
    /// File-name extension appended to the BAM path.
    pub fn extension(&self) -> &'static str {
        match self {
            IndexKind::Bai => ".bai",
            IndexKind::Bti => ".bti",
        }
    }

    /// Resolves an index kind from an index file name.
    pub fn from_path(path: &str) -> Option<IndexKind> {
        if path.ends_with(".bai") {
            Some(IndexKind::Bai)
        } else if path.ends_with(".bti") {
            Some(IndexKind::Bti)
        } else {
            None
        }
    }
}

/// How much index data stays resident between jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexCacheMode {
    /// All per-reference offsets in memory.
    Full,
    /// At most one reference resident; reloaded on demand.
    #[default]
    Limited,
    /// Every jump reads from disk and discards.
    None,
}

/// Half-open interval of virtual offsets covering one bin's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn new(start: u64, end: u64) -> Self {
        Chunk { start, end }
    }
}

/// A loaded index of either format.
#[derive(Debug)]
pub enum BamIndex {
    Bai(BaiIndex),
    Bti(BtiIndex),
}

impl BamIndex {
    pub fn kind(&self) -> IndexKind {
        match self {
            BamIndex::Bai(_) => IndexKind::Bai,
            BamIndex::Bti(_) => IndexKind::Bti,
        }
    }

    /// Builds fresh index data by streaming the reader's file once.
    /// The reader is left rewound to its first alignment.
    pub fn build(kind: IndexKind, reader: &mut BamReader) -> Result<BamIndex> {
        Ok(match kind {
            IndexKind::Bai => BamIndex::Bai(BaiIndex::build(reader)?),
            IndexKind::Bti => BamIndex::Bti(BtiIndex::build(reader)?),
        })
    }

    /// Loads an index file, honoring the cache mode for how much data
    /// stays resident.
    pub fn load(path: &str, cache_mode: IndexCacheMode) -> Result<BamIndex> {
        match IndexKind::from_path(path) {
            Some(IndexKind::Bti) => Ok(BamIndex::Bti(BtiIndex::load(path, cache_mode)?)),
            // Unrecognized extensions parse as the standard format and
            // fail on magic if they are something else entirely.
            _ => Ok(BamIndex::Bai(BaiIndex::load(path, cache_mode)?)),
        }
    }

    /// Writes the index in its on-disk format. Partially cached data is
    /// re-read from the source index file first.
    pub fn write(&mut self, path: &str) -> Result<()> {
        match self {
            BamIndex::Bai(i) => i.write(path),
            BamIndex::Bti(i) => i.write(path),
        }
    }

    /// Whether the given reference holds any alignments.
    pub fn has_alignments(&self, ref_id: i32) -> bool {
        match self {
            BamIndex::Bai(i) => i.has_alignments(ref_id),
            BamIndex::Bti(i) => i.has_alignments(ref_id),
        }
    }

    /// Seeks the reader to a virtual offset from which every alignment
    /// overlapping `region` is downstream. Returns false (not an error)
    /// when the region provably holds no alignments.
    pub fn jump(&mut self, reader: &mut BamReader, region: &BamRegion) -> Result<bool> {
        match self {
            BamIndex::Bai(i) => i.jump(reader, region),
            BamIndex::Bti(i) => i.jump(reader, region),
        }
    }

    pub fn set_cache_mode(&mut self, mode: IndexCacheMode) {
        match self {
            BamIndex::Bai(i) => i.set_cache_mode(mode),
            BamIndex::Bti(i) => i.set_cache_mode(mode),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw little-endian field IO over an index device
// ─────────────────────────────────────────────────────────────────────────────

use crate::device::IoDevice;

pub(crate) fn read_u32(dev: &mut IoDevice) -> Result<u32> {
    let mut b = [0u8; 4];
    dev.read_exact(&mut b)?;
    Ok(crate::bytes::unpack_u32(&b))
}

pub(crate) fn read_i32(dev: &mut IoDevice) -> Result<i32> {
    let mut b = [0u8; 4];
    dev.read_exact(&mut b)?;
    Ok(crate::bytes::unpack_i32(&b))
}

pub(crate) fn read_u64(dev: &mut IoDevice) -> Result<u64> {
    let mut b = [0u8; 8];
    dev.read_exact(&mut b)?;
    Ok(crate::bytes::unpack_u64(&b))
}

pub(crate) fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
