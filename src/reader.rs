//! File reader stage
//!
//! Reader workers pull [`FileTask`]s, stage each file's bytes into pooled
//! chunk-sized buffers and push the finished [`ChecksumTask`] downstream.
//! A failed open or read hands every buffer already acquired for that file
//! back to the pool before the failure is reported.

use crate::error::{Result, ScanError};
use crate::pool::{PoolHandle, PooledBuffer};
use crate::scanner::ScanStats;
use crate::sink::ResultSink;
use crate::source::{FileSource, SourceFile};
use crate::types::{ChecksumTask, FailureStage, FileFailure, FileTask};
use crossbeam_channel::{Receiver, SendError, Sender};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Reads whole files into pooled buffers
pub struct FileReader {
    source: Arc<dyn FileSource>,
    chunk_size: usize,
    max_file_size: u64,
}

impl FileReader {
    /// Create a reader staging files in `chunk_size` buffers
    ///
    /// `max_file_size` of 0 disables the size limit.
    pub fn new(source: Arc<dyn FileSource>, chunk_size: usize, max_file_size: u64) -> Self {
        Self {
            source,
            chunk_size,
            max_file_size,
        }
    }

    /// Stage the full content of `path`
    ///
    /// Empty files produce a task with no buffers. On error, nothing acquired
    /// from `pool` is kept.
    ///
    /// # Errors
    ///
    /// - [`ScanError::FileRead`] if the file cannot be opened or read
    /// - [`ScanError::TruncatedRead`] if the file shrinks while being read
    /// - [`ScanError::FileTooLarge`] if the file exceeds the size limit
    /// - [`ScanError::BufferTooLarge`] if the chunk size is out of range
    pub fn read(&self, pool: &PoolHandle, path: &Path) -> Result<ChecksumTask> {
        let mut file = self
            .source
            .open(path)
            .map_err(|e| ScanError::file_read(path, e))?;
        let length = file.len().map_err(|e| ScanError::file_read(path, e))?;

        if self.max_file_size > 0 && length > self.max_file_size {
            return Err(ScanError::FileTooLarge {
                path: path.to_path_buf(),
                size: length,
                limit: self.max_file_size,
            });
        }

        if length == 0 {
            return Ok(ChecksumTask::new(path.to_path_buf(), 0, Vec::new()));
        }

        let chunks = length.div_ceil(self.chunk_size as u64);
        let mut buffers = Vec::with_capacity(usize::try_from(chunks).unwrap_or(0));

        match self.stage(pool, file.as_mut(), path, length, &mut buffers) {
            Ok(()) => Ok(ChecksumTask::new(path.to_path_buf(), length, buffers)),
            Err(e) => {
                trace!("Returning {} buffers for failed read of {:?}", buffers.len(), path);
                pool.pool().release_all(buffers);
                Err(e)
            }
        }
    }

    fn stage(
        &self,
        pool: &PoolHandle,
        file: &mut dyn SourceFile,
        path: &Path,
        length: u64,
        buffers: &mut Vec<PooledBuffer>,
    ) -> Result<()> {
        let mut consumed = 0u64;

        while consumed < length {
            let mut buffer = pool.acquire(self.chunk_size)?;
            let want = (length - consumed).min(buffer.len() as u64) as usize;
            let filled = fill(file, &mut buffer[..want]);
            buffers.push(buffer);

            let filled = filled.map_err(|e| ScanError::file_read(path, e))?;
            consumed += filled as u64;
            if filled < want {
                return Err(ScanError::TruncatedRead {
                    path: path.to_path_buf(),
                    expected: length,
                    actual: consumed,
                });
            }
        }

        Ok(())
    }
}

/// Read until `buf` is full or the file ends
fn fill(file: &mut dyn SourceFile, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_into(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// One reader worker's loop
///
/// Runs until the file queue is closed and drained, then drops its sender so
/// the checksum stage can close once every reader is gone.
pub(crate) fn run_reader(
    id: usize,
    reader: Arc<FileReader>,
    pool: PoolHandle,
    sink: Arc<dyn ResultSink>,
    stats: Arc<ScanStats>,
    tasks: Receiver<FileTask>,
    output: Sender<ChecksumTask>,
) {
    debug!("Reader {} started on shard {}", id, pool.shard());

    for task in tasks.iter() {
        let path = task.into_path();
        match reader.read(&pool, &path) {
            Ok(staged) => {
                trace!("Read {:?} ({} bytes)", path, staged.total_length());
                // Blocks while the checksum queue is full
                if let Err(SendError(staged)) = output.send(staged) {
                    warn!("Checksum stage closed early, reader {} stopping", id);
                    let (_, _, buffers) = staged.into_parts();
                    pool.pool().release_all(buffers);
                    break;
                }
            }
            Err(error) => {
                warn!("Failed to read {:?}: {}", path, error);
                stats.record_failure();
                sink.failure(FileFailure::new(path, FailureStage::Read, error));
            }
        }
    }

    debug!("Reader {} exiting", id);
}
