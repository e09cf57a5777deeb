//! IO devices — the byte-stream layer underneath BGZF and the index
//! readers.
//!
//! A device is a plain byte stream with an optional random-access
//! capability. Two concrete variants exist: [`LocalFile`] (seekable,
//! positions in raw bytes) and [`StdioPipe`] (sequential only; `tell`
//! and `seek` fail with `NotRandomAccess`).
//!
//! Device name resolution: `"-"`, `"stdin"`, and `"stdout"` select the
//! pipe variant; any `scheme://` name is rejected here (remote transports
//! are out-of-scope collaborators); everything else is a local path.

pub mod local;
pub mod pipe;

pub use local::LocalFile;
pub use pipe::StdioPipe;

use crate::error::{BamError, IoError, IoErrorKind, Result};

/// Sentinel device name: read from standard input / write to standard
/// output depending on mode.
pub const STDIO_MARK: &str = "-";
pub const STDIN_MARK: &str = "stdin";
pub const STDOUT_MARK: &str = "stdout";

/// Seek origin for [`IoDevice::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start(u64),
    Current(i64),
    End(i64),
}

#[inline]
fn is_stdio(name: &str) -> bool {
    name == STDIO_MARK || name == STDIN_MARK || name == STDOUT_MARK
}

/// Returns `true` when `name` carries a URL scheme (`ftp://…`, `http://…`).
/// Such names belong to transport collaborators, not this layer.
#[inline]
fn has_scheme(name: &str) -> bool {
    name.contains("://")
}

/// A byte-stream device with an optional random-access capability.
#[derive(Debug)]
pub enum IoDevice {
    File(LocalFile),
    Pipe(StdioPipe),
}

impl IoDevice {
    /// Opens a device for reading, resolving the stdio sentinels.
    pub fn open_read(name: &str) -> Result<IoDevice> {
        if is_stdio(name) {
            return Ok(IoDevice::Pipe(StdioPipe::stdin()));
        }
        if has_scheme(name) {
            return Err(BamError::Io(IoError::with_path(IoErrorKind::Other, name)));
        }
        Ok(IoDevice::File(LocalFile::open(name)?))
    }

    /// Opens a device for writing, resolving the stdio sentinels.
    /// A local file is created or truncated.
    pub fn open_write(name: &str) -> Result<IoDevice> {
        if is_stdio(name) {
            return Ok(IoDevice::Pipe(StdioPipe::stdout()));
        }
        if has_scheme(name) {
            return Err(BamError::Io(IoError::with_path(IoErrorKind::Other, name)));
        }
        Ok(IoDevice::File(LocalFile::create(name)?))
    }

    /// Reads up to `buf.len()` bytes; returns the count actually read
    /// (0 at end of stream).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            IoDevice::File(f) => f.read(buf),
            IoDevice::Pipe(p) => p.read(buf),
        }
    }

    /// Reads exactly `buf.len()` bytes or fails with `UnexpectedEof`.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(BamError::io(IoErrorKind::UnexpectedEof));
            }
            filled += n;
        }
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            IoDevice::File(f) => f.write_all(buf),
            IoDevice::Pipe(p) => p.write_all(buf),
        }
    }

    /// Logical byte position. Fails on pipes.
    pub fn tell(&mut self) -> Result<u64> {
        match self {
            IoDevice::File(f) => f.tell(),
            IoDevice::Pipe(p) => p.tell(),
        }
    }

    /// Repositions the stream. Fails on pipes.
    pub fn seek(&mut self, whence: Whence) -> Result<u64> {
        match self {
            IoDevice::File(f) => f.seek(whence),
            IoDevice::Pipe(p) => p.seek(whence),
        }
    }

    pub fn is_random_access(&self) -> bool {
        matches!(self, IoDevice::File(_))
    }

    pub fn flush(&mut self) -> Result<()> {
        match self {
            IoDevice::File(f) => f.flush(),
            IoDevice::Pipe(p) => p.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_names_are_rejected() {
        let err = IoDevice::open_read("ftp://host/file.bam").unwrap_err();
        assert!(matches!(err, BamError::Io(_)));
        let err = IoDevice::open_write("http://host/file.bam").unwrap_err();
        assert!(matches!(err, BamError::Io(_)));
    }

    #[test]
    fn missing_file_reports_not_found() {
        let err = IoDevice::open_read("/definitely/not/here.bam").unwrap_err();
        match err {
            BamError::Io(e) => assert_eq!(e.kind, IoErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stdio_sentinels_resolve_to_pipes() {
        let dev = IoDevice::open_read("-").unwrap();
        assert!(!dev.is_random_access());
        let dev = IoDevice::open_read("stdin").unwrap();
        assert!(!dev.is_random_access());
        let dev = IoDevice::open_write("stdout").unwrap();
        assert!(!dev.is_random_access());
    }
}
