//! BAM file header codec plus the injectable SAM-text collaborator
//! interface.
//!
//! The binary header is: magic `"BAM\x01"`, LE32 text length, the SAM
//! header text (not NUL-terminated), LE32 reference count, then per
//! reference a LE32 name length (including NUL), the NUL-terminated
//! name, and a LE32 sequence length. Indexes into the reference vector
//! are the `ref_id` values carried by alignment records.
//!
//! The SAM text itself is opaque to this crate: callers that need a
//! structured header inject a [`SamTextCodec`] implementation.

use crate::bgzf::BgzfStream;
use crate::bytes;
use crate::error::{BamError, BamFormatErrorKind, Result};

/// BAM magic bytes.
pub const BAM_MAGIC: [u8; 4] = *b"BAM\x01";

/// One reference-dictionary entry, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefData {
    pub name: String,
    pub length: i32,
}

impl RefData {
    pub fn new(name: impl Into<String>, length: i32) -> Self {
        RefData {
            name: name.into(),
            length,
        }
    }
}

/// Header contents read from a BAM stream.
#[derive(Debug, Clone, Default)]
pub struct BamFileHeader {
    pub text: String,
    pub references: Vec<RefData>,
}

/// Reads magic, header text, and the reference dictionary from a
/// just-opened BGZF stream.
pub fn read_header(stream: &mut BgzfStream) -> Result<BamFileHeader> {
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic)?;
    if magic != BAM_MAGIC {
        return Err(BamError::format(BamFormatErrorKind::BadMagic));
    }

    let mut word = [0u8; 4];
    stream.read_exact(&mut word)?;
    let text_len = bytes::unpack_u32(&word) as usize;
    let mut text_bytes = vec![0u8; text_len];
    stream.read_exact(&mut text_bytes)?;
    let text = String::from_utf8_lossy(&text_bytes).into_owned();

    stream.read_exact(&mut word)?;
    let n_ref = bytes::unpack_u32(&word) as usize;
    let mut references = Vec::with_capacity(n_ref);
    for _ in 0..n_ref {
        stream.read_exact(&mut word)?;
        let name_len = bytes::unpack_u32(&word) as usize;
        if name_len == 0 {
            return Err(BamError::format(BamFormatErrorKind::ShortRead));
        }
        let mut name_bytes = vec![0u8; name_len];
        stream.read_exact(&mut name_bytes)?;
        // Name is NUL-terminated on disk; the NUL is not part of it.
        let end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();

        stream.read_exact(&mut word)?;
        let length = bytes::unpack_i32(&word);
        references.push(RefData { name, length });
    }

    Ok(BamFileHeader { text, references })
}

/// Writes magic, header text, and the reference dictionary to a
/// just-opened write-mode BGZF stream.
pub fn write_header(stream: &mut BgzfStream, text: &str, references: &[RefData]) -> Result<()> {
    stream.write(&BAM_MAGIC)?;

    let mut word = [0u8; 4];
    bytes::pack_u32(&mut word, text.len() as u32);
    stream.write(&word)?;
    stream.write(text.as_bytes())?;

    bytes::pack_u32(&mut word, references.len() as u32);
    stream.write(&word)?;
    for r in references {
        bytes::pack_u32(&mut word, r.name.len() as u32 + 1);
        stream.write(&word)?;
        stream.write(r.name.as_bytes())?;
        stream.write(&[0u8])?;
        bytes::pack_i32(&mut word, r.length);
        stream.write(&word)?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// SAM text collaborator
// ─────────────────────────────────────────────────────────────────────────────

/// Failure classification for the external SAM-text parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamParseErrorKind {
    UnknownTag,
    MissingRequiredTag,
    DuplicateId,
    MalformedLine,
}

/// Position-tagged parse failure reported by a [`SamTextCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamParseError {
    pub line: usize,
    pub column: usize,
    pub kind: SamParseErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One finding from header validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

/// Injectable text ↔ structured-header codec.
///
/// The crate hands SAM header text through verbatim; parsing, printing,
/// and validation belong to the collaborator. Parse warnings must never
/// abort a BAM read — the reader keeps the raw text regardless.
pub trait SamTextCodec {
    type Header;

    fn parse(&self, text: &str) -> std::result::Result<Self::Header, SamParseError>;
    fn print(&self, header: &Self::Header) -> String;
    fn validate(&self, header: &Self::Header, strict: bool) -> Vec<ValidationIssue>;
}
