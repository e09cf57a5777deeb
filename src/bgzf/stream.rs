//! Streaming BGZF codec over an [`IoDevice`].
//!
//! Read mode inflates block-by-block on demand; write mode stages
//! uncompressed bytes and deflates whole blocks. `tell`/`seek` operate
//! in virtual-offset space. The compressed device position is tracked
//! internally, so sequential reading works on pipes; only `seek`
//! requires random access.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::bgzf::constants::*;
use crate::bytes;
use crate::device::{IoDevice, Whence};
use crate::error::{BamError, BgzfErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

/// BGZF stream: owns the device plus one compressed and one uncompressed
/// scratch buffer (double-buffered; reset on seek).
#[derive(Debug)]
pub struct BgzfStream {
    device: IoDevice,
    mode: Mode,
    /// Uncompressed length of the currently loaded block (read mode).
    block_length: usize,
    /// Read/write cursor within the uncompressed buffer.
    block_offset: usize,
    /// Compressed offset of the current block's first byte.
    block_address: u64,
    /// Raw device position (compressed bytes consumed/emitted).
    file_pos: u64,
    compressed_block: Vec<u8>,
    uncompressed_block: Vec<u8>,
    compression: Compression,
    finished: bool,
}

impl BgzfStream {
    /// Opens a read-mode stream. The first block is loaded lazily on the
    /// first `read`.
    pub fn reader(device: IoDevice) -> BgzfStream {
        BgzfStream {
            device,
            mode: Mode::Read,
            block_length: 0,
            block_offset: 0,
            block_address: 0,
            file_pos: 0,
            compressed_block: vec![0; BGZF_MAX_BLOCK_SIZE],
            uncompressed_block: vec![0; BGZF_DEFAULT_BLOCK_SIZE],
            compression: Compression::default(),
            finished: false,
        }
    }

    /// Opens a write-mode stream. When `compressed` is false, blocks are
    /// emitted as stored (level 0) deflate for speed.
    pub fn writer(device: IoDevice, compressed: bool) -> BgzfStream {
        BgzfStream {
            device,
            mode: Mode::Write,
            block_length: 0,
            block_offset: 0,
            block_address: 0,
            file_pos: 0,
            compressed_block: vec![0; BGZF_MAX_BLOCK_SIZE],
            uncompressed_block: vec![0; BGZF_DEFAULT_BLOCK_SIZE],
            compression: if compressed {
                Compression::default()
            } else {
                Compression::none()
            },
            finished: false,
        }
    }

    /// Write mode only: 0 disables compression, 1–9 select a zlib level.
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = Compression::new(level.min(9));
    }

    pub fn is_random_access(&self) -> bool {
        self.device.is_random_access()
    }

    /// Current virtual offset.
    pub fn tell(&self) -> u64 {
        (self.block_address << 16) | (self.block_offset as u64 & 0xffff)
    }

    /// Seeks to a virtual offset. The block itself is loaded on the next
    /// read; the within-block offset is stashed and survives the load.
    pub fn seek(&mut self, voffset: u64) -> Result<()> {
        if !self.device.is_random_access() {
            return Err(BamError::bgzf(BgzfErrorKind::SeekUnsupported));
        }
        let block_offset = (voffset & 0xffff) as usize;
        let block_address = (voffset >> 16) & 0xffff_ffff_ffff;
        self.device.seek(Whence::Start(block_address))?;
        self.file_pos = block_address;
        self.block_address = block_address;
        self.block_offset = block_offset;
        self.block_length = 0; // current block no longer loaded
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read path
    // ─────────────────────────────────────────────────────────────────────

    /// Copies up to `data.len()` uncompressed bytes, loading successive
    /// blocks as needed. Returns 0 at end of stream (the empty EOF-marker
    /// block reads as EOF and is accepted silently).
    pub fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        if self.mode != Mode::Read || data.is_empty() {
            return Ok(0);
        }

        let mut total = 0;
        while total < data.len() {
            let mut available = self.block_length.saturating_sub(self.block_offset);
            if available == 0 {
                if !self.read_block()? {
                    break; // clean EOF
                }
                available = self.block_length.saturating_sub(self.block_offset);
                if available == 0 {
                    break; // empty block (EOF marker)
                }
            }

            let take = available.min(data.len() - total);
            data[total..total + take]
                .copy_from_slice(&self.uncompressed_block[self.block_offset..self.block_offset + take]);
            self.block_offset += take;
            total += take;
        }

        // Exactly exhausted: re-sync the block address to the device
        // position so tell() names the next block's first byte.
        if self.block_offset == self.block_length {
            self.block_address = self.file_pos;
            self.block_offset = 0;
            self.block_length = 0;
        }

        Ok(total)
    }

    /// Reads exactly `data.len()` bytes or fails with `TruncatedBlock`.
    pub fn read_exact(&mut self, data: &mut [u8]) -> Result<()> {
        let n = self.read(data)?;
        if n != data.len() {
            return Err(BamError::bgzf(BgzfErrorKind::TruncatedBlock));
        }
        Ok(())
    }

    /// Loads and inflates the next block. Returns false on clean EOF.
    fn read_block(&mut self) -> Result<bool> {
        let block_address = self.file_pos;

        // First header byte distinguishes clean EOF from a short block.
        let mut header = [0u8; BGZF_BLOCK_HEADER_LENGTH];
        let n = self.device.read(&mut header[..1])?;
        if n == 0 {
            self.block_length = 0;
            return Ok(false);
        }
        self.device
            .read_exact(&mut header[1..])
            .map_err(|_| BamError::bgzf(BgzfErrorKind::TruncatedBlock))?;

        if !check_block_header(&header) {
            return Err(BamError::bgzf(BgzfErrorKind::InvalidHeader));
        }

        let block_size = bytes::unpack_u16(&header[16..]) as usize + 1;
        if block_size < BGZF_BLOCK_HEADER_LENGTH + BGZF_BLOCK_FOOTER_LENGTH {
            return Err(BamError::bgzf(BgzfErrorKind::InvalidHeader));
        }

        self.compressed_block[..BGZF_BLOCK_HEADER_LENGTH].copy_from_slice(&header);
        self.device
            .read_exact(&mut self.compressed_block[BGZF_BLOCK_HEADER_LENGTH..block_size])
            .map_err(|_| BamError::bgzf(BgzfErrorKind::TruncatedBlock))?;
        self.file_pos = block_address + block_size as u64;

        let inflated = self.inflate_block(block_size)?;

        // Footer check: CRC32 then ISIZE, both over the inflated payload.
        let footer = &self.compressed_block[block_size - BGZF_BLOCK_FOOTER_LENGTH..block_size];
        let expected_crc = bytes::unpack_u32(footer);
        let expected_isize = bytes::unpack_u32(&footer[4..]) as usize;
        if inflated != expected_isize
            || crc32fast::hash(&self.uncompressed_block[..inflated]) != expected_crc
        {
            return Err(BamError::bgzf(BgzfErrorKind::TruncatedBlock));
        }

        // A pending seek leaves block_length == 0 with a stashed offset;
        // preserve that offset so the read resumes mid-block.
        if self.block_length != 0 {
            self.block_offset = 0;
        }
        self.block_address = block_address;
        self.block_length = inflated;
        Ok(true)
    }

    fn inflate_block(&mut self, block_size: usize) -> Result<usize> {
        let payload =
            &self.compressed_block[BGZF_BLOCK_HEADER_LENGTH..block_size - BGZF_BLOCK_FOOTER_LENGTH];
        let mut decoder = DeflateDecoder::new(payload);
        let mut total = 0;
        loop {
            if total == self.uncompressed_block.len() {
                // More output than a block may hold.
                let mut probe = [0u8; 1];
                match decoder.read(&mut probe) {
                    Ok(0) => break,
                    _ => return Err(BamError::bgzf(BgzfErrorKind::InflateFailed)),
                }
            }
            match decoder.read(&mut self.uncompressed_block[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(_) => return Err(BamError::bgzf(BgzfErrorKind::InflateFailed)),
            }
        }
        Ok(total)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Write path
    // ─────────────────────────────────────────────────────────────────────

    /// Stages `data` for compression, emitting full blocks as the buffer
    /// fills. Returns the byte count written (always `data.len()`).
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.mode != Mode::Write {
            return Ok(0);
        }

        let block_len = self.uncompressed_block.len();
        let mut written = 0;
        while written < data.len() {
            let take = (block_len - self.block_offset).min(data.len() - written);
            self.uncompressed_block[self.block_offset..self.block_offset + take]
                .copy_from_slice(&data[written..written + take]);
            self.block_offset += take;
            written += take;

            if self.block_offset == block_len {
                self.flush_block()?;
            }
        }
        Ok(written)
    }

    /// Deflates and emits every staged byte.
    pub fn flush_block(&mut self) -> Result<()> {
        while self.block_offset > 0 {
            let framed = self.deflate_block()?;
            self.device.write_all(&self.compressed_block[..framed])?;
            self.block_address += framed as u64;
            self.file_pos += framed as u64;
        }
        Ok(())
    }

    /// Compresses the staged buffer into one framed block in
    /// `compressed_block`, returning the framed length. Input that does
    /// not fit a 64 KiB frame is retried in 1 KiB smaller slices; the
    /// remainder moves to the buffer front for the next block.
    fn deflate_block(&mut self) -> Result<usize> {
        let overhead = BGZF_BLOCK_HEADER_LENGTH + BGZF_BLOCK_FOOTER_LENGTH;
        let mut input_len = self.block_offset;

        let deflated = loop {
            let mut encoder = DeflateEncoder::new(Vec::new(), self.compression);
            encoder
                .write_all(&self.uncompressed_block[..input_len])
                .map_err(|_| BamError::bgzf(BgzfErrorKind::DeflateFailed))?;
            let out = encoder
                .finish()
                .map_err(|_| BamError::bgzf(BgzfErrorKind::DeflateFailed))?;

            if out.len() + overhead <= BGZF_MAX_BLOCK_SIZE {
                break out;
            }
            // Does not fit; shrink the input and retry.
            input_len = input_len.saturating_sub(1024);
            if input_len == 0 {
                return Err(BamError::bgzf(BgzfErrorKind::DeflateFailed));
            }
        };

        let framed = deflated.len() + overhead;
        let buffer = &mut self.compressed_block;
        buffer[..BGZF_BLOCK_HEADER_LENGTH].fill(0);
        buffer[0] = GZIP_ID1;
        buffer[1] = GZIP_ID2;
        buffer[2] = CM_DEFLATE;
        buffer[3] = FLG_FEXTRA;
        buffer[9] = OS_UNKNOWN;
        bytes::pack_u16(&mut buffer[10..], BGZF_XLEN);
        buffer[12] = BGZF_SI1;
        buffer[13] = BGZF_SI2;
        bytes::pack_u16(&mut buffer[14..], BGZF_SLEN);
        bytes::pack_u16(&mut buffer[16..], (framed - 1) as u16);
        buffer[BGZF_BLOCK_HEADER_LENGTH..BGZF_BLOCK_HEADER_LENGTH + deflated.len()]
            .copy_from_slice(&deflated);

        let crc = crc32fast::hash(&self.uncompressed_block[..input_len]);
        bytes::pack_u32(&mut buffer[framed - 8..], crc);
        bytes::pack_u32(&mut buffer[framed - 4..], input_len as u32);

        // Slide any bytes the retry loop could not fit to the front.
        let remaining = self.block_offset - input_len;
        if remaining > 0 {
            self.uncompressed_block.copy_within(input_len..self.block_offset, 0);
        }
        self.block_offset = remaining;

        Ok(framed)
    }

    /// Write mode: flushes the final partial block and appends the fixed
    /// EOF-marker block. Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.mode == Mode::Write {
            self.flush_block()?;
            self.device.write_all(&BGZF_EOF_MARKER)?;
            self.device.flush()?;
        }
        self.finished = true;
        Ok(())
    }

    /// Checks whether the device ends with the 28-byte EOF marker,
    /// restoring the device position afterwards. Random-access devices
    /// only; pipes report `true` (cannot look ahead).
    pub fn has_eof_marker(&mut self) -> Result<bool> {
        if !self.device.is_random_access() {
            return Ok(true);
        }
        let saved = self.device.tell()?;
        let end = self.device.seek(Whence::End(0))?;
        let ok = if end >= BGZF_EOF_MARKER.len() as u64 {
            self.device
                .seek(Whence::End(-(BGZF_EOF_MARKER.len() as i64)))?;
            let mut tail = [0u8; 28];
            self.device.read_exact(&mut tail)?;
            tail == BGZF_EOF_MARKER
        } else {
            false
        };
        self.device.seek(Whence::Start(saved))?;
        Ok(ok)
    }
}

impl Drop for BgzfStream {
    fn drop(&mut self) {
        // Best-effort flush; errors surfaced only via explicit finish().
        if self.mode == Mode::Write && !self.finished {
            let _ = self.finish();
        }
    }
}

/// Validates the fixed BGZF member header fields.
fn check_block_header(header: &[u8; BGZF_BLOCK_HEADER_LENGTH]) -> bool {
    header[0] == GZIP_ID1
        && header[1] == GZIP_ID2
        && header[2] == CM_DEFLATE
        && (header[3] & FLG_FEXTRA) != 0
        && bytes::unpack_u16(&header[10..]) == BGZF_XLEN
        && header[12] == BGZF_SI1
        && header[13] == BGZF_SI2
        && bytes::unpack_u16(&header[14..]) == BGZF_SLEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_validation_rejects_each_field() {
        let mut good = [0u8; BGZF_BLOCK_HEADER_LENGTH];
        good[0] = GZIP_ID1;
        good[1] = GZIP_ID2;
        good[2] = CM_DEFLATE;
        good[3] = FLG_FEXTRA;
        good[10] = 6;
        good[12] = BGZF_SI1;
        good[13] = BGZF_SI2;
        good[14] = 2;
        assert!(check_block_header(&good));

        for (i, bad_value) in [(0usize, 0u8), (1, 0), (2, 7), (3, 0), (10, 5), (12, b'X'), (13, b'Y'), (14, 3)] {
            let mut h = good;
            h[i] = bad_value;
            assert!(!check_block_header(&h), "field {i} should fail");
        }
    }

    #[test]
    fn virtual_offset_packing() {
        let dev = IoDevice::open_read("-").unwrap();
        let s = BgzfStream::reader(dev);
        assert_eq!(s.tell(), 0);
        // tell = (address << 16) | offset
        let mut s = s;
        s.block_address = 0x1234;
        s.block_offset = 0x0042;
        assert_eq!(s.tell(), (0x1234 << 16) | 0x42);
    }

    #[test]
    fn seek_on_pipe_is_rejected() {
        let dev = IoDevice::open_read("-").unwrap();
        let mut s = BgzfStream::reader(dev);
        let err = s.seek(0x10000).unwrap_err();
        match err {
            BamError::Bgzf(e) => assert_eq!(e.kind, BgzfErrorKind::SeekUnsupported),
            other => panic!("unexpected error: {other}"),
        }
    }
}
