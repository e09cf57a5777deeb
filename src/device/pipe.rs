//! Stdio pipe device: sequential only.
//!
//! `tell` and `seek` fail with `NotRandomAccess`; the reader surfaces
//! that as `UsageError::RandomAccessRequired` when a caller asks for a
//! region on a piped stream.

use std::io::{Read, Write};

use crate::device::Whence;
use crate::error::{BamError, IoErrorKind, Result};

#[derive(Debug)]
enum PipeEnd {
    In(std::io::Stdin),
    Out(std::io::Stdout),
}

#[derive(Debug)]
pub struct StdioPipe {
    end: PipeEnd,
}

impl StdioPipe {
    pub fn stdin() -> StdioPipe {
        StdioPipe {
            end: PipeEnd::In(std::io::stdin()),
        }
    }

    pub fn stdout() -> StdioPipe {
        StdioPipe {
            end: PipeEnd::Out(std::io::stdout()),
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.end {
            PipeEnd::In(s) => s
                .read(buf)
                .map_err(|e| BamError::Io(crate::error::IoError::from_std(e, None))),
            PipeEnd::Out(_) => Err(BamError::io(IoErrorKind::Other)),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match &mut self.end {
            PipeEnd::Out(s) => s
                .write_all(buf)
                .map_err(|e| BamError::Io(crate::error::IoError::from_std(e, None))),
            PipeEnd::In(_) => Err(BamError::io(IoErrorKind::Other)),
        }
    }

    pub fn tell(&mut self) -> Result<u64> {
        Err(BamError::io(IoErrorKind::NotRandomAccess))
    }

    pub fn seek(&mut self, _whence: Whence) -> Result<u64> {
        Err(BamError::io(IoErrorKind::NotRandomAccess))
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.end {
            PipeEnd::Out(s) => s
                .flush()
                .map_err(|e| BamError::Io(crate::error::IoError::from_std(e, None))),
            PipeEnd::In(_) => Ok(()),
        }
    }
}
