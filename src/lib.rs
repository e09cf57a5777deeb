// BAM random-access I/O — BGZF framing, record codec, range indices,
// multi-file merge.

pub mod bgzf;
pub mod bytes;
pub mod device;
pub mod error;
pub mod header;
pub mod index;
pub mod multi;
pub mod reader;
pub mod record;
pub mod region;
pub mod writer;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the primary API surface.
// ─────────────────────────────────────────────────────────────────────────────

/// Crate-wide result alias.
pub use error::Result;
/// Umbrella error; every failure in the crate is one of its families.
pub use error::BamError;

/// Sequential + random-access reader over one BAM file.
pub use reader::BamReader;
/// Sequential writer; records go out in call order, byte-for-byte.
pub use writer::{BamWriter, WriterOptions};
/// K-way ordered merge over several opened readers.
pub use multi::{BamMultiReader, MultiReaderOptions, SortOrder};

/// One alignment record, with lazily materialized character data.
pub use record::{BamAlignment, CigarOp, TagValue};
/// Reference-dictionary entry; vector order defines the wire ref ids.
pub use header::RefData;
/// Injectable SAM header text codec (external collaborator).
pub use header::{SamParseError, SamParseErrorKind, SamTextCodec, Severity, ValidationIssue};
/// Genomic region: zero-based bounds, optionally spanning references.
pub use region::BamRegion;

/// Index selection and cache policy.
pub use index::{BamIndex, IndexCacheMode, IndexKind};

/// BGZF stream for callers that need raw virtual-offset access.
pub use bgzf::BgzfStream;
