//! BGZF block-layout constants.

/// Fixed gzip member header length: 10-byte gzip header + XLEN + the
/// 6-byte "BC" extra subfield.
pub const BGZF_BLOCK_HEADER_LENGTH: usize = 18;

/// CRC32 + ISIZE trailer.
pub const BGZF_BLOCK_FOOTER_LENGTH: usize = 8;

/// Maximum compressed size of one block (BSIZE is a u16 of size − 1).
pub const BGZF_MAX_BLOCK_SIZE: usize = 65536;

/// Uncompressed staging-buffer size; a block is emitted when the buffer
/// fills.
pub const BGZF_DEFAULT_BLOCK_SIZE: usize = 65536;

pub const GZIP_ID1: u8 = 0x1f;
pub const GZIP_ID2: u8 = 0x8b;
pub const CM_DEFLATE: u8 = 8;
pub const FLG_FEXTRA: u8 = 4;
pub const OS_UNKNOWN: u8 = 0xff;
pub const BGZF_XLEN: u16 = 6;
pub const BGZF_SI1: u8 = b'B';
pub const BGZF_SI2: u8 = b'C';
pub const BGZF_SLEN: u16 = 2;

/// Empty terminating block appended to every well-formed BAM file.
pub const BGZF_EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_marker_is_a_valid_empty_block() {
        // The marker must itself parse as a BGZF block of compressed
        // size 28 holding zero uncompressed bytes.
        assert_eq!(BGZF_EOF_MARKER[0], GZIP_ID1);
        assert_eq!(BGZF_EOF_MARKER[1], GZIP_ID2);
        assert_eq!(BGZF_EOF_MARKER[2], CM_DEFLATE);
        assert_eq!(BGZF_EOF_MARKER[3] & FLG_FEXTRA, FLG_FEXTRA);
        assert_eq!(BGZF_EOF_MARKER[12], BGZF_SI1);
        assert_eq!(BGZF_EOF_MARKER[13], BGZF_SI2);
        let bsize = u16::from_le_bytes([BGZF_EOF_MARKER[16], BGZF_EOF_MARKER[17]]);
        assert_eq!(bsize as usize + 1, BGZF_EOF_MARKER.len());
        // ISIZE (last four bytes) is zero.
        assert_eq!(&BGZF_EOF_MARKER[24..], &[0, 0, 0, 0]);
    }
}
