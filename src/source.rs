//! Raw file access used by the reader stage
//!
//! The reader only needs three things from the file system: open a file,
//! learn its length, and read bytes straight into a caller-owned slice.
//! [`StdFileSource`] does this with `std::fs::File` and no buffering layer in
//! between, so every read lands directly in a pooled buffer.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// An open file being read front to back
pub trait SourceFile: Send {
    /// Length of the file at open time
    fn len(&self) -> io::Result<u64>;

    /// Read up to `buf.len()` bytes, returning how many were read (0 at EOF)
    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Something that can open files for reading
pub trait FileSource: Send + Sync {
    /// Open `path` for reading
    fn open(&self, path: &Path) -> io::Result<Box<dyn SourceFile>>;
}

/// Reads from the local file system
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSource;

impl FileSource for StdFileSource {
    fn open(&self, path: &Path) -> io::Result<Box<dyn SourceFile>> {
        Ok(Box::new(File::open(path)?))
    }
}

impl SourceFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}
