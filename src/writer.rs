//! BAM writer: header, reference dictionary, then records, in call
//! order, byte-for-byte. Ordering is the caller's responsibility — the
//! writer never sorts or batches visibly.

use crate::bgzf::BgzfStream;
use crate::device::IoDevice;
use crate::error::Result;
use crate::header::{write_header, RefData};
use crate::record::codec::encode_record;
use crate::record::BamAlignment;

/// Output options; the default writes compressed blocks at the zlib
/// default level.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// When false, blocks are stored uncompressed-deflate for speed.
    pub compressed: bool,
    /// Explicit zlib level (0–9); overrides `compressed` when set.
    pub compression_level: Option<u32>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            compressed: true,
            compression_level: None,
        }
    }
}

/// Writer over one BAM file (or `-`/`stdout` for a pipe).
pub struct BamWriter {
    stream: BgzfStream,
    /// Scratch for record encoding, reused across saves.
    encode_buf: Vec<u8>,
    finished: bool,
}

impl BamWriter {
    /// Creates the output, emitting magic, header text, and the
    /// reference dictionary immediately.
    pub fn create(
        filename: &str,
        header_text: &str,
        references: &[RefData],
        options: WriterOptions,
    ) -> Result<BamWriter> {
        let device = IoDevice::open_write(filename)?;
        let mut stream = BgzfStream::writer(device, options.compressed);
        if let Some(level) = options.compression_level {
            stream.set_compression_level(level);
        }

        write_header(&mut stream, header_text, references)?;

        Ok(BamWriter {
            stream,
            encode_buf: Vec::new(),
            finished: false,
        })
    }

    /// Encodes and appends one record.
    pub fn save_alignment(&mut self, al: &BamAlignment) -> Result<()> {
        self.encode_buf.clear();
        encode_record(al, &mut self.encode_buf)?;
        self.stream.write(&self.encode_buf)?;
        Ok(())
    }

    /// Virtual offset the next record will start at.
    pub fn tell(&self) -> u64 {
        self.stream.tell()
    }

    /// Flushes the final partial block and appends the EOF marker.
    /// Idempotent; also runs on drop, but only an explicit call reports
    /// failures.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.stream.finish()?;
        self.finished = true;
        Ok(())
    }

    /// Finishes and releases the output device.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }
}

impl Drop for BamWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
