//! Local-file device: random access, positions in raw bytes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::device::Whence;
use crate::error::{BamError, IoError, Result};

#[derive(Debug)]
pub struct LocalFile {
    file: File,
    path: PathBuf,
}

impl LocalFile {
    pub fn open(path: &str) -> Result<LocalFile> {
        let file = File::open(path)
            .map_err(|e| BamError::Io(IoError::from_std(e, Some(path.as_ref()))))?;
        Ok(LocalFile {
            file,
            path: PathBuf::from(path),
        })
    }

    pub fn create(path: &str) -> Result<LocalFile> {
        let file = File::create(path)
            .map_err(|e| BamError::Io(IoError::from_std(e, Some(path.as_ref()))))?;
        Ok(LocalFile {
            file,
            path: PathBuf::from(path),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn wrap(&self, e: std::io::Error) -> BamError {
        BamError::Io(IoError::from_std(e, Some(&self.path)))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf).map_err(|e| self.wrap(e))
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf).map_err(|e| self.wrap(e))
    }

    pub fn tell(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|e| self.wrap(e))
    }

    pub fn seek(&mut self, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Start(n) => SeekFrom::Start(n),
            Whence::Current(n) => SeekFrom::Current(n),
            Whence::End(n) => SeekFrom::End(n),
        };
        self.file.seek(target).map_err(|e| self.wrap(e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| self.wrap(e))
    }
}
