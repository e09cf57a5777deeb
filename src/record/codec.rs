//! Wire codec for one alignment record.
//!
//! On-disk layout (all little-endian): LE32 block_size, a 32-byte fixed
//! core (ref_id, pos, bin/mapq/name-length word, flag/cigar-count word,
//! l_seq, mate ref, mate pos, insert size), then the variable data:
//! NUL-terminated name, packed CIGAR words, 4-bit packed sequence,
//! raw phred qualities, and the auxiliary-tag area.

use crate::bgzf::BgzfStream;
use crate::bytes;
use crate::error::{BamError, BamFormatErrorKind, Result};
use crate::record::alignment::{BamAlignment, CigarOp};
use crate::record::{BAM_CORE_SIZE, CIGAR_LOOKUP, SEQ_LOOKUP};

/// Decodes the next record from `stream` into `al` (core data plus the
/// raw variable buffer; char data stays unmaterialized). Returns false
/// at end of stream — either a zero block_size or no further bytes.
pub fn decode_record(stream: &mut BgzfStream, al: &mut BamAlignment) -> Result<bool> {
    // block_size prefix. A clean EOF here ends the stream; a partial
    // read is corruption.
    let mut word = [0u8; 4];
    let n = stream.read(&mut word)?;
    if n == 0 {
        return Ok(false);
    }
    if n != 4 {
        return Err(BamError::format(BamFormatErrorKind::ShortRead));
    }
    let block_size = bytes::unpack_u32(&word) as usize;
    if block_size == 0 {
        return Ok(false);
    }
    if block_size < BAM_CORE_SIZE {
        return Err(BamError::format(BamFormatErrorKind::BlockSizeMismatch));
    }

    let mut core = [0u8; BAM_CORE_SIZE];
    stream
        .read_exact(&mut core)
        .map_err(|_| BamError::format(BamFormatErrorKind::ShortRead))?;

    al.ref_id = bytes::unpack_i32(&core[0..]);
    al.position = bytes::unpack_i32(&core[4..]);

    let bin_mq_nl = bytes::unpack_u32(&core[8..]);
    al.bin = (bin_mq_nl >> 16) as u16;
    al.map_quality = (bin_mq_nl >> 8) as u8;
    al.support.query_name_length = bin_mq_nl & 0xff;

    let flag_nc = bytes::unpack_u32(&core[12..]);
    al.flag = (flag_nc >> 16) as u16;
    al.support.num_cigar_ops = flag_nc & 0xffff;

    al.support.query_sequence_length = bytes::unpack_u32(&core[16..]);
    al.mate_ref_id = bytes::unpack_i32(&core[20..]);
    al.mate_position = bytes::unpack_i32(&core[24..]);
    al.insert_size = bytes::unpack_i32(&core[28..]);

    al.length = al.support.query_sequence_length as i32;
    al.support.block_length = block_size as u32;

    // Raw variable data, retained on the record.
    let data_len = block_size - BAM_CORE_SIZE;
    al.support.all_char_data.resize(data_len, 0);
    stream
        .read_exact(&mut al.support.all_char_data)
        .map_err(|_| BamError::format(BamFormatErrorKind::ShortRead))?;

    // CIGAR is parsed eagerly so end_position works in core-only mode.
    let cigar_offset = al.support.query_name_length as usize;
    let cigar_end = cigar_offset + al.support.num_cigar_ops as usize * 4;
    if cigar_end > data_len {
        return Err(BamError::format(BamFormatErrorKind::BlockSizeMismatch));
    }
    al.cigar.clear();
    al.cigar.reserve(al.support.num_cigar_ops as usize);
    for i in 0..al.support.num_cigar_ops as usize {
        let word = bytes::unpack_u32(&al.support.all_char_data[cigar_offset + i * 4..]);
        let code = (word & 0xf) as usize;
        if code >= CIGAR_LOOKUP.len() {
            return Err(BamError::format(BamFormatErrorKind::BadCigarOp));
        }
        al.cigar.push(CigarOp::new(CIGAR_LOOKUP[code] as char, word >> 4));
    }

    al.name.clear();
    al.query_bases.clear();
    al.aligned_bases.clear();
    al.qualities.clear();
    al.tag_data.clear();
    al.support.has_core_only = true;
    Ok(true)
}

/// Encodes `al` in full wire form (block_size prefix included) onto the
/// end of `out`.
///
/// A record still in core-only form re-emits its retained raw data
/// byte-for-byte; a materialized record is re-packed from its character
/// fields.
pub fn encode_record(al: &BamAlignment, out: &mut Vec<u8>) -> Result<()> {
    let rebuilt = if al.support.has_core_only {
        None
    } else {
        let mut data = Vec::with_capacity(
            al.name.len() + 1 + al.cigar.len() * 4 + al.query_bases.len() + al.tag_data.len(),
        );
        encode_char_data(al, &mut data)?;
        Some(data)
    };

    let (name_len, n_cigar, seq_len, data_ref): (usize, usize, usize, &[u8]) = match &rebuilt {
        None => (
            al.support.query_name_length as usize,
            al.support.num_cigar_ops as usize,
            al.support.query_sequence_length as usize,
            &al.support.all_char_data,
        ),
        Some(data) => (al.name.len() + 1, al.cigar.len(), al.query_bases.len(), data),
    };

    if name_len > 0xff || n_cigar > 0xffff {
        return Err(BamError::format(BamFormatErrorKind::BadTagSize));
    }

    let block_size = BAM_CORE_SIZE + data_ref.len();
    out.reserve(4 + block_size);

    let mut word = [0u8; 4];
    bytes::pack_u32(&mut word, block_size as u32);
    out.extend_from_slice(&word);

    bytes::pack_i32(&mut word, al.ref_id);
    out.extend_from_slice(&word);
    bytes::pack_i32(&mut word, al.position);
    out.extend_from_slice(&word);
    bytes::pack_u32(
        &mut word,
        ((al.bin as u32) << 16) | ((al.map_quality as u32) << 8) | name_len as u32,
    );
    out.extend_from_slice(&word);
    bytes::pack_u32(&mut word, ((al.flag as u32) << 16) | n_cigar as u32);
    out.extend_from_slice(&word);
    bytes::pack_u32(&mut word, seq_len as u32);
    out.extend_from_slice(&word);
    bytes::pack_i32(&mut word, al.mate_ref_id);
    out.extend_from_slice(&word);
    bytes::pack_i32(&mut word, al.mate_position);
    out.extend_from_slice(&word);
    bytes::pack_i32(&mut word, al.insert_size);
    out.extend_from_slice(&word);

    out.extend_from_slice(data_ref);
    Ok(())
}

/// Packs the variable data of a materialized record.
fn encode_char_data(al: &BamAlignment, data: &mut Vec<u8>) -> Result<()> {
    data.extend_from_slice(al.name.as_bytes());
    data.push(0);

    let mut word = [0u8; 4];
    for op in &al.cigar {
        let code = cigar_code(op.op)?;
        bytes::pack_u32(&mut word, (op.len << 4) | code);
        data.extend_from_slice(&word);
    }

    // 4-bit packed bases, high nibble first; odd-length sequences leave
    // the final low nibble zero.
    let bases = al.query_bases.as_bytes();
    let mut packed = 0u8;
    for (i, &b) in bases.iter().enumerate() {
        let nibble = base_nibble(b)?;
        if i % 2 == 0 {
            packed = nibble << 4;
        } else {
            data.push(packed | nibble);
        }
    }
    if bases.len() % 2 == 1 {
        data.push(packed);
    }

    // Qualities back to numeric phred; a record without stored
    // qualities gets the 0xFF "missing" fill.
    if al.qualities.len() == bases.len() {
        for &q in al.qualities.as_bytes() {
            data.push(q.wrapping_sub(33));
        }
    } else {
        data.resize(data.len() + bases.len(), 0xff);
    }

    data.extend_from_slice(&al.tag_data);
    Ok(())
}

fn cigar_code(op: char) -> Result<u32> {
    CIGAR_LOOKUP
        .iter()
        .position(|&c| c as char == op)
        .map(|p| p as u32)
        .ok_or_else(|| BamError::format(BamFormatErrorKind::BadCigarOp))
}

fn base_nibble(base: u8) -> Result<u8> {
    let upper = base.to_ascii_uppercase();
    SEQ_LOOKUP
        .iter()
        .position(|&c| c == upper)
        .map(|p| p as u8)
        .ok_or_else(|| BamError::format(BamFormatErrorKind::BadSequenceNibble))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cigar_codes_cover_alphabet() {
        for (i, &c) in CIGAR_LOOKUP.iter().enumerate() {
            assert_eq!(cigar_code(c as char).unwrap(), i as u32);
        }
        assert!(cigar_code('Q').is_err());
    }

    #[test]
    fn base_nibbles_cover_alphabet() {
        for (i, &c) in SEQ_LOOKUP.iter().enumerate() {
            assert_eq!(base_nibble(c).unwrap(), i as u8);
        }
        assert_eq!(base_nibble(b'a').unwrap(), 1); // case-insensitive
        assert!(base_nibble(b'!').is_err());
    }

    #[test]
    fn encode_packs_core_words() {
        let mut al = BamAlignment::new();
        al.name = "read1".to_string();
        al.ref_id = 1;
        al.position = 100;
        al.bin = 4681;
        al.map_quality = 37;
        al.flag = 0x0063;
        al.query_bases = "ACGT".to_string();
        al.qualities = "IIII".to_string();
        al.cigar = vec![CigarOp::new('M', 4)];
        al.mate_ref_id = 1;
        al.mate_position = 200;
        al.insert_size = 104;

        let mut wire = Vec::new();
        encode_record(&al, &mut wire).unwrap();

        let block_size = bytes::unpack_u32(&wire) as usize;
        assert_eq!(block_size + 4, wire.len());
        assert_eq!(bytes::unpack_i32(&wire[4..]), 1); // ref_id
        assert_eq!(bytes::unpack_i32(&wire[8..]), 100); // pos
        let bin_mq_nl = bytes::unpack_u32(&wire[12..]);
        assert_eq!(bin_mq_nl >> 16, 4681);
        assert_eq!((bin_mq_nl >> 8) & 0xff, 37);
        assert_eq!(bin_mq_nl & 0xff, 6); // "read1" + NUL
        let flag_nc = bytes::unpack_u32(&wire[16..]);
        assert_eq!(flag_nc >> 16, 0x0063);
        assert_eq!(flag_nc & 0xffff, 1);
        assert_eq!(bytes::unpack_u32(&wire[20..]), 4); // l_seq
        // Packed sequence: A=1, C=2, G=4, T=8 -> 0x12 0x48
        let seq_offset = 4 + BAM_CORE_SIZE + 6 + 4;
        assert_eq!(&wire[seq_offset..seq_offset + 2], &[0x12, 0x48]);
        // Qualities: 'I' (73) - 33 = 40
        assert_eq!(&wire[seq_offset + 2..seq_offset + 6], &[40, 40, 40, 40]);
    }
}
