//! Error taxonomy for the BAM I/O stack.
//!
//! Every fallible operation in the crate returns one of the structured
//! errors below; diagnostic text is produced by the caller from the error
//! value. The library itself never prints and never terminates the
//! process.
//!
//! The set is closed: device-layer failures ([`IoError`]), BGZF framing
//! failures ([`BgzfError`]), BAM record/layout failures
//! ([`BamFormatError`]), index-file failures ([`IndexError`]), and
//! API-misuse failures ([`UsageError`]), all wrapped by [`BamError`].

use core::fmt;
use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BamError>;

// ─────────────────────────────────────────────────────────────────────────────
// Device layer
// ─────────────────────────────────────────────────────────────────────────────

/// Classification of an IO-device failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    UnexpectedEof,
    /// Operation requires random access but the device is a pipe.
    NotRandomAccess,
    Other,
}

/// Device-layer failure, tagged with the path it occurred on (when known).
#[derive(Debug)]
pub struct IoError {
    pub kind: IoErrorKind,
    pub path: Option<PathBuf>,
    source: Option<std::io::Error>,
}

impl IoError {
    pub fn new(kind: IoErrorKind) -> Self {
        IoError {
            kind,
            path: None,
            source: None,
        }
    }

    pub fn with_path(kind: IoErrorKind, path: impl Into<PathBuf>) -> Self {
        IoError {
            kind,
            path: Some(path.into()),
            source: None,
        }
    }

    /// Wraps a `std::io::Error`, mapping its kind onto the closed set.
    pub fn from_std(err: std::io::Error, path: Option<&std::path::Path>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => IoErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => IoErrorKind::PermissionDenied,
            std::io::ErrorKind::UnexpectedEof => IoErrorKind::UnexpectedEof,
            _ => IoErrorKind::Other,
        };
        IoError {
            kind,
            path: path.map(|p| p.to_path_buf()),
            source: Some(err),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            IoErrorKind::NotFound => "file not found",
            IoErrorKind::PermissionDenied => "permission denied",
            IoErrorKind::UnexpectedEof => "unexpected end of file",
            IoErrorKind::NotRandomAccess => "device does not support random access",
            IoErrorKind::Other => "io error",
        };
        match &self.path {
            Some(p) => write!(f, "{}: {}", p.display(), what),
            None => f.write_str(what),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BGZF layer
// ─────────────────────────────────────────────────────────────────────────────

/// BGZF block-framing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgzfErrorKind {
    /// Block header fails the fixed-field validation (gzip magic, CM,
    /// FEXTRA, "BC" subfield, BSIZE bounds).
    InvalidHeader,
    /// Block body or footer shorter than the header promised, or the
    /// CRC32/ISIZE footer does not match the inflated payload.
    TruncatedBlock,
    InflateFailed,
    DeflateFailed,
    /// Virtual-offset seek attempted on a non-seekable device.
    SeekUnsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BgzfError {
    pub kind: BgzfErrorKind,
}

impl BgzfError {
    pub fn new(kind: BgzfErrorKind) -> Self {
        BgzfError { kind }
    }
}

impl fmt::Display for BgzfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.kind {
            BgzfErrorKind::InvalidHeader => "invalid BGZF block header",
            BgzfErrorKind::TruncatedBlock => "truncated or corrupt BGZF block",
            BgzfErrorKind::InflateFailed => "BGZF block inflate failed",
            BgzfErrorKind::DeflateFailed => "BGZF block deflate failed",
            BgzfErrorKind::SeekUnsupported => "BGZF seek requires a random-access device",
        })
    }
}

impl std::error::Error for BgzfError {}

// ─────────────────────────────────────────────────────────────────────────────
// BAM record / file layout
// ─────────────────────────────────────────────────────────────────────────────

/// Failure decoding or encoding the BAM wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BamFormatErrorKind {
    /// File does not begin with `"BAM\x01"`.
    BadMagic,
    /// Fewer bytes available than a fixed-size field requires.
    ShortRead,
    /// Record block_size disagrees with the data actually present.
    BlockSizeMismatch,
    /// CIGAR op code outside `MIDNSHP=X`.
    BadCigarOp,
    /// Sequence character not representable in the 4-bit base alphabet.
    BadSequenceNibble,
    /// Unknown auxiliary-tag type code.
    BadTagType,
    /// Tag name, tag payload, or another variable-length field has an
    /// impossible size.
    BadTagSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BamFormatError {
    pub kind: BamFormatErrorKind,
}

impl BamFormatError {
    pub fn new(kind: BamFormatErrorKind) -> Self {
        BamFormatError { kind }
    }
}

impl fmt::Display for BamFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.kind {
            BamFormatErrorKind::BadMagic => "not a BAM file (bad magic)",
            BamFormatErrorKind::ShortRead => "BAM record truncated",
            BamFormatErrorKind::BlockSizeMismatch => "BAM record block size mismatch",
            BamFormatErrorKind::BadCigarOp => "invalid CIGAR operation",
            BamFormatErrorKind::BadSequenceNibble => "invalid sequence base",
            BamFormatErrorKind::BadTagType => "unknown tag type code",
            BamFormatErrorKind::BadTagSize => "malformed tag entry",
        })
    }
}

impl std::error::Error for BamFormatError {}

// ─────────────────────────────────────────────────────────────────────────────
// Index files
// ─────────────────────────────────────────────────────────────────────────────

/// Failure loading, building, or querying a `.bai`/`.bti` index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorKind {
    /// Index file does not begin with the expected magic.
    BadMagic,
    /// Index format version is not usable; rebuild the index.
    StaleVersion,
    /// Index build found coordinates out of order within a reference.
    UnsortedInput,
    /// Operation requires an index but none is loaded.
    Missing,
    /// Index data is structurally invalid.
    Corrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexError {
    pub kind: IndexErrorKind,
}

impl IndexError {
    pub fn new(kind: IndexErrorKind) -> Self {
        IndexError { kind }
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.kind {
            IndexErrorKind::BadMagic => "not a recognized index file (bad magic)",
            IndexErrorKind::StaleVersion => {
                "index file version is not supported; rebuild the index"
            }
            IndexErrorKind::UnsortedInput => "cannot index: file is not sorted by coordinate",
            IndexErrorKind::Missing => "no index loaded",
            IndexErrorKind::Corrupt => "index file is corrupt",
        })
    }
}

impl std::error::Error for IndexError {}

// ─────────────────────────────────────────────────────────────────────────────
// API usage
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-side misuse of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageErrorKind {
    NotOpen,
    AlreadyOpen,
    /// Random-access operation requested on a pipe-backed stream.
    RandomAccessRequired,
    UnknownReference,
    InvalidRegion,
    /// Multi-reader inputs disagree on the reference dictionary.
    ReferenceMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageError {
    pub kind: UsageErrorKind,
}

impl UsageError {
    pub fn new(kind: UsageErrorKind) -> Self {
        UsageError { kind }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.kind {
            UsageErrorKind::NotOpen => "stream is not open",
            UsageErrorKind::AlreadyOpen => "stream is already open",
            UsageErrorKind::RandomAccessRequired => "operation requires a random-access device",
            UsageErrorKind::UnknownReference => "unknown reference sequence",
            UsageErrorKind::InvalidRegion => "invalid region bounds",
            UsageErrorKind::ReferenceMismatch => "input files have mismatched reference data",
        })
    }
}

impl std::error::Error for UsageError {}

// ─────────────────────────────────────────────────────────────────────────────
// Umbrella
// ─────────────────────────────────────────────────────────────────────────────

/// Any failure the crate can surface.
#[derive(Debug)]
pub enum BamError {
    Io(IoError),
    Bgzf(BgzfError),
    Format(BamFormatError),
    Index(IndexError),
    Usage(UsageError),
}

impl BamError {
    /// Shorthand constructors used throughout the crate.
    pub(crate) fn io(kind: IoErrorKind) -> Self {
        BamError::Io(IoError::new(kind))
    }

    pub(crate) fn bgzf(kind: BgzfErrorKind) -> Self {
        BamError::Bgzf(BgzfError::new(kind))
    }

    pub(crate) fn format(kind: BamFormatErrorKind) -> Self {
        BamError::Format(BamFormatError::new(kind))
    }

    pub(crate) fn index(kind: IndexErrorKind) -> Self {
        BamError::Index(IndexError::new(kind))
    }

    pub(crate) fn usage(kind: UsageErrorKind) -> Self {
        BamError::Usage(UsageError::new(kind))
    }
}

impl fmt::Display for BamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BamError::Io(e) => e.fmt(f),
            BamError::Bgzf(e) => e.fmt(f),
            BamError::Format(e) => e.fmt(f),
            BamError::Index(e) => e.fmt(f),
            BamError::Usage(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for BamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BamError::Io(e) => Some(e),
            BamError::Bgzf(e) => Some(e),
            BamError::Format(e) => Some(e),
            BamError::Index(e) => Some(e),
            BamError::Usage(e) => Some(e),
        }
    }
}

impl From<IoError> for BamError {
    fn from(e: IoError) -> Self {
        BamError::Io(e)
    }
}

impl From<BgzfError> for BamError {
    fn from(e: BgzfError) -> Self {
        BamError::Bgzf(e)
    }
}

impl From<BamFormatError> for BamError {
    fn from(e: BamFormatError) -> Self {
        BamError::Format(e)
    }
}

impl From<IndexError> for BamError {
    fn from(e: IndexError) -> Self {
        BamError::Index(e)
    }
}

impl From<UsageError> for BamError {
    fn from(e: UsageError) -> Self {
        BamError::Usage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings_are_stable() {
        assert_eq!(
            BgzfError::new(BgzfErrorKind::InvalidHeader).to_string(),
            "invalid BGZF block header"
        );
        assert_eq!(
            BamFormatError::new(BamFormatErrorKind::BadMagic).to_string(),
            "not a BAM file (bad magic)"
        );
        assert_eq!(
            IndexError::new(IndexErrorKind::StaleVersion).to_string(),
            "index file version is not supported; rebuild the index"
        );
        assert_eq!(
            UsageError::new(UsageErrorKind::RandomAccessRequired).to_string(),
            "operation requires a random-access device"
        );
    }

    #[test]
    fn io_error_kind_mapping() {
        let e = IoError::from_std(
            std::io::Error::new(std::io::ErrorKind::NotFound, "x"),
            None,
        );
        assert_eq!(e.kind, IoErrorKind::NotFound);
        let e = IoError::from_std(
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "x"),
            None,
        );
        assert_eq!(e.kind, IoErrorKind::UnexpectedEof);
    }

    #[test]
    fn umbrella_wraps_every_family() {
        let all: Vec<BamError> = vec![
            BamError::io(IoErrorKind::Other),
            BamError::bgzf(BgzfErrorKind::TruncatedBlock),
            BamError::format(BamFormatErrorKind::ShortRead),
            BamError::index(IndexErrorKind::Missing),
            BamError::usage(UsageErrorKind::NotOpen),
        ];
        for e in &all {
            assert!(!e.to_string().is_empty());
        }
    }
}
