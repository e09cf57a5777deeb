//! BGZF — blocked gzip framing with 64-bit virtual offsets.
//!
//! A BGZF file is a sequence of independent gzip members, each at most
//! 64 KiB compressed, whose fixed-layout extra subfield records the
//! compressed member size. Because members are self-delimiting, any
//! point in the uncompressed stream can be named by a *virtual offset*:
//! `(compressed_block_start << 16) | offset_within_uncompressed_block`.
//!
//! [`BgzfStream`] frames this virtual-offset space onto an [`IoDevice`],
//! transparently inflating on read and deflating on write.
//!
//! [`IoDevice`]: crate::device::IoDevice

pub mod constants;
pub mod stream;

pub use constants::{BGZF_EOF_MARKER, BGZF_MAX_BLOCK_SIZE};
pub use stream::BgzfStream;
