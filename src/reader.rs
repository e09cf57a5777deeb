//! BAM reader: sequential decoding plus index-backed random access.
//!
//! A reader owns exactly one BGZF stream (and through it one IO device)
//! and at most one index; everything is released when the reader drops.
//! After `open`, records stream in file order. `set_region` consults
//! the index for a jump target, then filters decoded records against
//! the region until the stream crosses its right edge.

use log::warn;

use crate::bgzf::BgzfStream;
use crate::device::IoDevice;
use crate::error::{BamError, IndexErrorKind, Result, UsageErrorKind};
use crate::header::{read_header, BamFileHeader, RefData, SamParseError, SamTextCodec};
use crate::index::{BamIndex, IndexCacheMode, IndexKind};
use crate::record::codec::decode_record;
use crate::record::BamAlignment;
use crate::region::{BamRegion, RegionState};

/// Reader over one BAM file (or pipe).
#[derive(Debug)]
pub struct BamReader {
    stream: BgzfStream,
    filename: String,
    index_filename: Option<String>,
    header: BamFileHeader,
    /// Virtual offset of the first alignment record.
    alignments_begin: u64,
    index: Option<BamIndex>,
    cache_mode: IndexCacheMode,
    region: BamRegion,
    has_alignments_in_region: bool,
}

impl BamReader {
    /// Opens a BAM file (or `-`/`stdin` for a pipe), reading the header
    /// and reference dictionary. No index is loaded; see
    /// [`open_index`](Self::open_index), [`locate_index`](Self::locate_index),
    /// or [`open_with_index`](Self::open_with_index).
    pub fn open(filename: &str) -> Result<BamReader> {
        let device = IoDevice::open_read(filename)?;
        let mut stream = BgzfStream::reader(device);

        // A missing terminator usually means a truncated file; not fatal.
        if !stream.has_eof_marker()? {
            warn!("{filename}: BGZF EOF marker absent; file may be truncated");
        }

        let header = read_header(&mut stream)?;
        let alignments_begin = stream.tell();

        Ok(BamReader {
            stream,
            filename: filename.to_string(),
            index_filename: None,
            header,
            alignments_begin,
            index: None,
            cache_mode: IndexCacheMode::default(),
            region: BamRegion::default(),
            has_alignments_in_region: true,
        })
    }

    /// Opens a BAM file and loads the named index.
    pub fn open_with_index(filename: &str, index_filename: &str) -> Result<BamReader> {
        let mut reader = Self::open(filename)?;
        reader.open_index(index_filename)?;
        Ok(reader)
    }

    /// Loads an index file for random access.
    pub fn open_index(&mut self, index_filename: &str) -> Result<()> {
        let mut index = BamIndex::load(index_filename, self.cache_mode)?;
        index.set_cache_mode(self.cache_mode);
        self.index = Some(index);
        self.index_filename = Some(index_filename.to_string());
        Ok(())
    }

    /// Looks for `<file>.bai` / `<file>.bti` next to the BAM file,
    /// preferring `kind`. Returns false when neither exists.
    pub fn locate_index(&mut self, kind: IndexKind) -> Result<bool> {
        let preferred = format!("{}{}", self.filename, kind.extension());
        let fallback_kind = match kind {
            IndexKind::Bai => IndexKind::Bti,
            IndexKind::Bti => IndexKind::Bai,
        };
        let fallback = format!("{}{}", self.filename, fallback_kind.extension());

        for candidate in [preferred, fallback] {
            if std::path::Path::new(&candidate).exists() {
                self.open_index(&candidate)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True when an index is loaded.
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Builds a fresh index over the whole file, writes it next to the
    /// BAM file, and binds it to this reader. The stream position is
    /// saved and restored, so the operation is unobservable to callers
    /// in the middle of a sequential read.
    pub fn create_index(&mut self, kind: IndexKind) -> Result<()> {
        if !self.stream.is_random_access() {
            return Err(BamError::usage(UsageErrorKind::RandomAccessRequired));
        }

        let saved_offset = self.stream.tell();
        let saved_region = self.region;
        let saved_has = self.has_alignments_in_region;
        self.region.clear();

        let built = BamIndex::build(kind, self);

        self.stream.seek(saved_offset)?;
        self.region = saved_region;
        self.has_alignments_in_region = saved_has;

        let mut index = built?;
        let index_path = format!("{}{}", self.filename, kind.extension());
        index.write(&index_path)?;
        index.set_cache_mode(self.cache_mode);
        self.index = Some(index);
        self.index_filename = Some(index_path);
        Ok(())
    }

    /// Changes how much index data stays resident between jumps.
    pub fn set_index_cache_mode(&mut self, mode: IndexCacheMode) {
        self.cache_mode = mode;
        if let Some(index) = self.index.as_mut() {
            index.set_cache_mode(mode);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Header / reference access
    // ─────────────────────────────────────────────────────────────────────

    /// The SAM header text, verbatim from the file.
    pub fn header_text(&self) -> &str {
        &self.header.text
    }

    /// Parses the header text through an injected SAM codec.
    pub fn parse_header<C: SamTextCodec>(
        &self,
        codec: &C,
    ) -> std::result::Result<C::Header, SamParseError> {
        codec.parse(&self.header.text)
    }

    pub fn references(&self) -> &[RefData] {
        &self.header.references
    }

    pub fn reference_count(&self) -> usize {
        self.header.references.len()
    }

    /// Wire ref id for a reference name.
    pub fn reference_id(&self, name: &str) -> Option<i32> {
        self.header
            .references
            .iter()
            .position(|r| r.name == name)
            .map(|i| i as i32)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Path of the bound index file, when one is loaded.
    pub fn index_filename(&self) -> Option<&str> {
        self.index_filename.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Record streaming
    // ─────────────────────────────────────────────────────────────────────

    /// Next record with char data materialized. Returns false at end of
    /// stream (or past the active region).
    pub fn next_alignment(&mut self, al: &mut BamAlignment) -> Result<bool> {
        if self.next_alignment_core(al)? {
            al.build_char_data()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Next record, core fields only; char data stays raw until the
    /// caller asks for it. Honors the active region: records ending
    /// before it are skipped, the first record starting past it ends the
    /// stream.
    pub fn next_alignment_core(&mut self, al: &mut BamAlignment) -> Result<bool> {
        if !self.region.is_null() && !self.has_alignments_in_region {
            return Ok(false);
        }
        if !self.load_next_core(al)? {
            return Ok(false);
        }
        if !self.region.is_left_bound_specified() {
            return Ok(true);
        }

        loop {
            match self.overlap_state(al) {
                RegionState::After => return Ok(false),
                RegionState::Within => return Ok(true),
                RegionState::Before => {
                    if !self.load_next_core(al)? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Raw record load with no region filtering; used by the index
    /// machinery while probing.
    pub(crate) fn load_next_core(&mut self, al: &mut BamAlignment) -> Result<bool> {
        decode_record(&mut self.stream, al)
    }

    /// Seeks back to the first alignment and clears any active region.
    pub fn rewind(&mut self) -> Result<()> {
        self.stream.seek(self.alignments_begin)?;

        // Probe the first record so corruption surfaces here rather
        // than on the next read, then reposition.
        let mut probe = BamAlignment::new();
        self.load_next_core(&mut probe)?;
        self.stream.seek(self.alignments_begin)?;

        self.region.clear();
        self.has_alignments_in_region = true;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Regions
    // ─────────────────────────────────────────────────────────────────────

    /// Restricts subsequent reads to `region` using the loaded index.
    ///
    /// The region's left bound is advanced to the first reference that
    /// actually holds alignments (its position reset to 0) before the
    /// index jump. A region that provably holds no alignments is not an
    /// error; subsequent reads simply end immediately.
    pub fn set_region(&mut self, region: BamRegion) -> Result<()> {
        // Cleared first so index probing reads raw records.
        self.region.clear();
        self.has_alignments_in_region = true;

        if !self.stream.is_random_access() {
            return Err(BamError::usage(UsageErrorKind::RandomAccessRequired));
        }
        if self.index.is_none() {
            return Err(BamError::index(IndexErrorKind::Missing));
        }
        if !region.is_left_bound_specified() {
            return Err(BamError::usage(UsageErrorKind::InvalidRegion));
        }
        let n_ref = self.header.references.len() as i32;
        if region.left_ref_id >= n_ref
            || (region.is_right_bound_specified() && region.right_ref_id >= n_ref)
        {
            return Err(BamError::usage(UsageErrorKind::UnknownReference));
        }
        if region.left_position > self.header.references[region.left_ref_id as usize].length {
            return Err(BamError::usage(UsageErrorKind::InvalidRegion));
        }

        let adjusted = self.adjust_region(region);
        if !self.has_alignments_in_region {
            self.region = adjusted;
            return Ok(());
        }

        // The index borrows the reader while probing, so it is detached
        // for the duration of the jump.
        let mut index = self.index.take().expect("index presence checked above");
        let jumped = index.jump(self, &adjusted);
        self.index = Some(index);

        self.has_alignments_in_region = jumped?;
        self.region = adjusted;
        Ok(())
    }

    /// Clears the active region; reading continues from the current
    /// position in plain file order.
    pub fn clear_region(&mut self) {
        self.region.clear();
        self.has_alignments_in_region = true;
    }

    /// Walks references rightward from the region's left bound until one
    /// with alignments is found, updating `has_alignments_in_region`.
    fn adjust_region(&mut self, mut region: BamRegion) -> BamRegion {
        let index = self.index.as_ref().expect("called with index loaded");

        self.has_alignments_in_region = false;
        let right_bound = if region.is_right_bound_specified() {
            region.right_ref_id
        } else {
            self.header.references.len() as i32 - 1
        };

        let mut current = region.left_ref_id;
        while current <= right_bound {
            if index.has_alignments(current) {
                self.has_alignments_in_region = true;
                break;
            }
            current += 1;
        }

        if self.has_alignments_in_region && current != region.left_ref_id {
            region.left_ref_id = current;
            region.left_position = 0;
        }
        region
    }

    /// Where `al` falls relative to the active region. Only called with
    /// a specified left bound.
    fn overlap_state(&self, al: &BamAlignment) -> RegionState {
        let region = &self.region;

        if al.ref_id < region.left_ref_id {
            return RegionState::Before;
        }

        if al.ref_id == region.left_ref_id {
            if al.position >= region.left_position {
                // Started inside; a right bound on the same reference
                // may still exclude it.
                if region.is_right_bound_specified()
                    && region.left_ref_id == region.right_ref_id
                    && al.position > region.right_position
                {
                    return RegionState::After;
                }
                return RegionState::Within;
            }
            // Starts left of the region; overlaps iff it reaches it.
            if al.end_position(false, true) >= region.left_position {
                return RegionState::Within;
            }
            return RegionState::Before;
        }

        // Past the left-bound reference.
        if !region.is_right_bound_specified() {
            return RegionState::Within;
        }
        if al.ref_id < region.right_ref_id {
            return RegionState::Within;
        }
        if al.ref_id > region.right_ref_id {
            return RegionState::After;
        }
        if al.position <= region.right_position {
            RegionState::Within
        } else {
            RegionState::After
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stream plumbing for the index machinery
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn stream_tell(&self) -> u64 {
        self.stream.tell()
    }

    pub(crate) fn stream_seek(&mut self, voffset: u64) -> Result<()> {
        self.stream.seek(voffset)
    }

    /// Seek to the first alignment without the probe or region reset.
    pub(crate) fn rewind_stream(&mut self) -> Result<()> {
        self.stream.seek(self.alignments_begin)
    }

    /// Releases the stream, device, and any index.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CigarOp;

    fn reader_with_region(region: BamRegion) -> BamReader {
        let device = IoDevice::open_read("-").unwrap();
        BamReader {
            stream: BgzfStream::reader(device),
            filename: "-".to_string(),
            index_filename: None,
            header: BamFileHeader {
                text: String::new(),
                references: vec![
                    RefData::new("seq1", 1575),
                    RefData::new("seq2", 1584),
                    RefData::new("seq3", 2000),
                ],
            },
            alignments_begin: 0,
            index: None,
            cache_mode: IndexCacheMode::default(),
            region,
            has_alignments_in_region: true,
        }
    }

    fn mapped(ref_id: i32, position: i32, len: u32) -> BamAlignment {
        let mut al = BamAlignment::new();
        al.ref_id = ref_id;
        al.position = position;
        al.cigar = vec![CigarOp::new('M', len)];
        al
    }

    #[test]
    fn overlap_on_left_reference() {
        let r = reader_with_region(BamRegion::new(1, 100, 1, 200));

        assert_eq!(r.overlap_state(&mapped(0, 500, 50)), RegionState::Before);
        assert_eq!(r.overlap_state(&mapped(1, 150, 10)), RegionState::Within);
        assert_eq!(r.overlap_state(&mapped(1, 201, 10)), RegionState::After);
        // Starts before the region but reaches into it.
        assert_eq!(r.overlap_state(&mapped(1, 60, 40)), RegionState::Within);
        // Ends short of the region.
        assert_eq!(r.overlap_state(&mapped(1, 60, 30)), RegionState::Before);
    }

    #[test]
    fn overlap_past_left_reference() {
        // No right bound: everything after the left bound is in.
        let r = reader_with_region(BamRegion::from(0, 100));
        assert_eq!(r.overlap_state(&mapped(2, 0, 10)), RegionState::Within);

        // Right bound on a later reference.
        let r = reader_with_region(BamRegion::new(0, 100, 2, 500));
        assert_eq!(r.overlap_state(&mapped(1, 0, 10)), RegionState::Within);
        assert_eq!(r.overlap_state(&mapped(2, 400, 10)), RegionState::Within);
        assert_eq!(r.overlap_state(&mapped(2, 501, 10)), RegionState::After);
    }

    #[test]
    fn set_region_on_pipe_requires_random_access() {
        // Piped streams cannot seek, with or without an index.
        let mut r = reader_with_region(BamRegion::default());
        let err = r.set_region(BamRegion::from(0, 100)).unwrap_err();
        match err {
            BamError::Usage(e) => assert_eq!(e.kind, UsageErrorKind::RandomAccessRequired),
            other => panic!("unexpected error: {other}"),
        }
    }
}
