//! In-memory alignment record.

use crate::error::{BamError, BamFormatErrorKind, Result};
use crate::record::{
    FLAG_DUPLICATE, FLAG_FAILED_QC, FLAG_FIRST_MATE, FLAG_MATE_REVERSE_STRAND,
    FLAG_MATE_UNMAPPED, FLAG_PAIRED, FLAG_PROPER_PAIR, FLAG_REVERSE_STRAND, FLAG_SECONDARY,
    FLAG_SECOND_MATE, FLAG_UNMAPPED, SEQ_LOOKUP,
};

/// One CIGAR operation: a type over `MIDNSHP=X` and a base count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub op: char,
    pub len: u32,
}

impl CigarOp {
    pub fn new(op: char, len: u32) -> Self {
        CigarOp { op, len }
    }
}

/// Raw decode state retained alongside the public fields.
#[derive(Debug, Clone, Default)]
pub(crate) struct SupportData {
    /// The record's variable data exactly as on disk (name, packed
    /// CIGAR, packed sequence, qualities, tags).
    pub all_char_data: Vec<u8>,
    pub block_length: u32,
    pub num_cigar_ops: u32,
    /// Read-name length including the terminating NUL.
    pub query_name_length: u32,
    pub query_sequence_length: u32,
    pub has_core_only: bool,
}

/// A BAM alignment.
///
/// Core fields (positions, flags, CIGAR) are always populated after a
/// decode. Character fields (`name`, `query_bases`, `aligned_bases`,
/// `qualities`, `tag_data`) are populated lazily by
/// [`build_char_data`](BamAlignment::build_char_data), which core-mode
/// readers skip.
#[derive(Debug, Clone, Default)]
pub struct BamAlignment {
    pub name: String,
    /// Query sequence length (`l_seq` on disk).
    pub length: i32,
    /// Bases as reported by the sequencer, `=ACMGRSVTWYHKDBN` alphabet.
    pub query_bases: String,
    /// Bases laid out against the reference per CIGAR (gaps as '-',
    /// padding as '*').
    pub aligned_bases: String,
    /// FASTQ-style qualities (phred + 33 ASCII).
    pub qualities: String,
    /// Raw auxiliary-tag bytes; use the tag accessors to query/modify.
    pub tag_data: Vec<u8>,
    pub ref_id: i32,
    pub position: i32,
    pub bin: u16,
    pub map_quality: u8,
    pub flag: u16,
    pub cigar: Vec<CigarOp>,
    pub mate_ref_id: i32,
    pub mate_position: i32,
    pub insert_size: i32,
    pub(crate) support: SupportData,
}

impl BamAlignment {
    pub fn new() -> Self {
        BamAlignment {
            ref_id: -1,
            position: -1,
            mate_ref_id: -1,
            mate_position: -1,
            ..Default::default()
        }
    }

    /// True while only core data has been decoded.
    pub fn is_core_only(&self) -> bool {
        self.support.has_core_only
    }

    /// Reference position one past the last base consumed by this
    /// alignment. Ops in `{M, D, N, =, X}` consume reference (plus `P`
    /// when `use_padded`); the result is shifted by −1 when a closed
    /// (non-zero-based) end is requested. Unmapped records return
    /// `position` unchanged.
    pub fn end_position(&self, use_padded: bool, zero_based: bool) -> i32 {
        if self.ref_id < 0 {
            return self.position;
        }
        let mut end = self.position;
        for op in &self.cigar {
            match op.op {
                'M' | 'D' | 'N' | '=' | 'X' => end += op.len as i32,
                'P' if use_padded => end += op.len as i32,
                _ => {}
            }
        }
        if !zero_based {
            end -= 1;
        }
        end
    }

    /// Materializes name, sequence, qualities, aligned bases, and the
    /// tag buffer from the retained raw data. Idempotent.
    pub fn build_char_data(&mut self) -> Result<()> {
        if !self.support.has_core_only {
            return Ok(());
        }

        let data = &self.support.all_char_data;
        let data_len = data.len();
        let name_len = self.support.query_name_length as usize;
        let seq_len = self.support.query_sequence_length as usize;
        let seq_offset = name_len + self.support.num_cigar_ops as usize * 4;
        let qual_offset = seq_offset + (seq_len + 1) / 2;
        let tag_offset = qual_offset + seq_len;
        if tag_offset > data_len || name_len == 0 || name_len > data_len {
            return Err(BamError::format(BamFormatErrorKind::ShortRead));
        }

        // Name occupies query_name_length bytes, NUL included.
        let name_end = data[..name_len]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_len - 1);
        self.name = String::from_utf8_lossy(&data[..name_end]).into_owned();

        // Unpack 4-bit bases, high nibble first.
        self.query_bases.clear();
        self.query_bases.reserve(seq_len);
        for i in 0..seq_len {
            let byte = data[seq_offset + i / 2];
            let nibble = (byte >> (4 * (1 - (i % 2)))) & 0xf;
            self.query_bases.push(SEQ_LOOKUP[nibble as usize] as char);
        }

        // Qualities: numeric phred to ASCII. A 0xFF "missing" sentinel
        // wraps to the same characters the char arithmetic always
        // produced; the bytes round-trip unchanged.
        self.qualities.clear();
        self.qualities.reserve(seq_len);
        for i in 0..seq_len {
            self.qualities
                .push(data[qual_offset + i].wrapping_add(33) as char);
        }

        self.tag_data.clear();
        self.tag_data.extend_from_slice(&data[tag_offset..]);

        self.build_aligned_bases()?;

        self.support.has_core_only = false;
        Ok(())
    }

    /// Expands `query_bases` against the CIGAR.
    fn build_aligned_bases(&mut self) -> Result<()> {
        self.aligned_bases.clear();
        if self.query_bases.is_empty() {
            return Ok(());
        }
        self.aligned_bases.reserve(self.query_bases.len());

        let bases = self.query_bases.as_bytes();
        let mut k = 0usize;
        for op in &self.cigar {
            let n = op.len as usize;
            match op.op {
                'M' | 'I' | '=' | 'X' => {
                    let end = (k + n).min(bases.len());
                    for &b in &bases[k..end] {
                        self.aligned_bases.push(b as char);
                    }
                    k += n;
                }
                'S' => k += n, // soft clip: consume query, emit nothing
                'D' => {
                    for _ in 0..n {
                        self.aligned_bases.push('-');
                    }
                }
                'P' => {
                    for _ in 0..n {
                        self.aligned_bases.push('*');
                    }
                }
                'N' => {
                    for _ in 0..n {
                        self.aligned_bases.push('N');
                    }
                }
                'H' => {} // hard clip: nothing consumed, nothing emitted
                _ => return Err(BamError::format(BamFormatErrorKind::BadCigarOp)),
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Flag queries / mutators
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_paired(&self) -> bool {
        self.flag & FLAG_PAIRED != 0
    }
    pub fn is_proper_pair(&self) -> bool {
        self.flag & FLAG_PROPER_PAIR != 0
    }
    pub fn is_mapped(&self) -> bool {
        self.flag & FLAG_UNMAPPED == 0
    }
    pub fn is_mate_mapped(&self) -> bool {
        self.flag & FLAG_MATE_UNMAPPED == 0
    }
    pub fn is_reverse_strand(&self) -> bool {
        self.flag & FLAG_REVERSE_STRAND != 0
    }
    pub fn is_mate_reverse_strand(&self) -> bool {
        self.flag & FLAG_MATE_REVERSE_STRAND != 0
    }
    pub fn is_first_mate(&self) -> bool {
        self.flag & FLAG_FIRST_MATE != 0
    }
    pub fn is_second_mate(&self) -> bool {
        self.flag & FLAG_SECOND_MATE != 0
    }
    pub fn is_primary_alignment(&self) -> bool {
        self.flag & FLAG_SECONDARY == 0
    }
    pub fn is_failed_qc(&self) -> bool {
        self.flag & FLAG_FAILED_QC != 0
    }
    pub fn is_duplicate(&self) -> bool {
        self.flag & FLAG_DUPLICATE != 0
    }

    fn set_flag(&mut self, bit: u16, on: bool) {
        if on {
            self.flag |= bit;
        } else {
            self.flag &= !bit;
        }
    }

    pub fn set_is_paired(&mut self, on: bool) {
        self.set_flag(FLAG_PAIRED, on);
    }
    pub fn set_is_proper_pair(&mut self, on: bool) {
        self.set_flag(FLAG_PROPER_PAIR, on);
    }
    pub fn set_is_mapped(&mut self, on: bool) {
        self.set_flag(FLAG_UNMAPPED, !on);
    }
    pub fn set_is_mate_mapped(&mut self, on: bool) {
        self.set_flag(FLAG_MATE_UNMAPPED, !on);
    }
    pub fn set_is_reverse_strand(&mut self, on: bool) {
        self.set_flag(FLAG_REVERSE_STRAND, on);
    }
    pub fn set_is_mate_reverse_strand(&mut self, on: bool) {
        self.set_flag(FLAG_MATE_REVERSE_STRAND, on);
    }
    pub fn set_is_first_mate(&mut self, on: bool) {
        self.set_flag(FLAG_FIRST_MATE, on);
    }
    pub fn set_is_second_mate(&mut self, on: bool) {
        self.set_flag(FLAG_SECOND_MATE, on);
    }
    pub fn set_is_primary_alignment(&mut self, on: bool) {
        self.set_flag(FLAG_SECONDARY, !on);
    }
    pub fn set_is_failed_qc(&mut self, on: bool) {
        self.set_flag(FLAG_FAILED_QC, on);
    }
    pub fn set_is_duplicate(&mut self, on: bool) {
        self.set_flag(FLAG_DUPLICATE, on);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Common tag conveniences
    // ─────────────────────────────────────────────────────────────────────

    /// Value of the `NM` (edit distance) tag, when present and numeric.
    pub fn edit_distance(&self) -> Result<Option<i64>> {
        self.int_tag("NM")
    }

    /// Value of the `RG` (read group) tag, when present.
    pub fn read_group(&self) -> Result<Option<String>> {
        self.string_tag("RG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_cigar(position: i32, ops: &[(char, u32)]) -> BamAlignment {
        let mut al = BamAlignment::new();
        al.ref_id = 0;
        al.position = position;
        al.cigar = ops.iter().map(|&(op, len)| CigarOp::new(op, len)).collect();
        al
    }

    #[test]
    fn end_position_counts_reference_ops() {
        // 8M2I4M1D3M from position 100: M/D consume reference, I does not.
        let al = with_cigar(100, &[('M', 8), ('I', 2), ('M', 4), ('D', 1), ('M', 3)]);
        assert_eq!(al.end_position(false, true), 116);
        assert_eq!(al.end_position(false, false), 115);
    }

    #[test]
    fn end_position_padded_and_skip_ops() {
        let al = with_cigar(10, &[('S', 5), ('M', 10), ('N', 20), ('M', 5), ('P', 2)]);
        assert_eq!(al.end_position(false, true), 45);
        assert_eq!(al.end_position(true, true), 47);
    }

    #[test]
    fn end_position_of_unmapped_is_position() {
        let mut al = BamAlignment::new();
        al.position = 1234;
        assert_eq!(al.ref_id, -1);
        assert_eq!(al.end_position(false, true), 1234);
        assert_eq!(al.end_position(true, false), 1234);
    }

    #[test]
    fn aligned_bases_expansion() {
        let mut al = with_cigar(0, &[('M', 2), ('S', 1), ('D', 2), ('M', 1), ('H', 3)]);
        al.query_bases = "ACGT".to_string();
        al.build_aligned_bases().unwrap();
        // M×2 -> "AC", S skips 'G', D×2 -> "--", M -> 'T', H nothing.
        assert_eq!(al.aligned_bases, "AC--T");
    }

    #[test]
    fn flag_accessors_roundtrip() {
        let mut al = BamAlignment::new();
        al.set_is_paired(true);
        al.set_is_mapped(false);
        al.set_is_reverse_strand(true);
        assert!(al.is_paired());
        assert!(!al.is_mapped());
        assert!(al.is_reverse_strand());
        assert_eq!(al.flag, FLAG_PAIRED | FLAG_UNMAPPED | FLAG_REVERSE_STRAND);
        al.set_is_mapped(true);
        assert!(al.is_mapped());
    }
}
