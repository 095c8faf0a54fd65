//! Core data types shared across the pipeline
//!
//! Work items move between stages by value and are never mutated after they
//! are built:
//!
//! - [`DirectoryTask`]: a directory waiting to be expanded by the walker
//! - [`FileTask`]: a matching file waiting to be read
//! - [`ChecksumTask`]: a fully staged file waiting to be checksummed
//!
//! Results leave the pipeline as [`ChecksumRecord`]s and [`FileFailure`]s, and
//! a finished run is described by a [`ScanSummary`].

use crate::error::ScanError;
use crate::pool::PooledBuffer;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A directory waiting to be expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTask {
    path: PathBuf,
    root: usize,
}

impl DirectoryTask {
    /// Create a task for `path`, discovered under root number `root`
    pub fn new(path: PathBuf, root: usize) -> Self {
        Self { path, root }
    }

    /// Directory to expand
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the root this directory was reached from
    pub fn root(&self) -> usize {
        self.root
    }
}

/// A matching file waiting to be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    path: PathBuf,
}

impl FileTask {
    /// Create a task for `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// File to read
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take ownership of the path
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// A file whose content is staged in pooled buffers
///
/// The logical content is the concatenation of the buffers truncated to
/// `total_length`. Whoever holds the task owns every buffer in it and must
/// return them to the pool.
#[derive(Debug)]
pub struct ChecksumTask {
    filename: PathBuf,
    total_length: u64,
    buffers: Vec<PooledBuffer>,
}

impl ChecksumTask {
    /// Build a task from staged buffers
    pub fn new(filename: PathBuf, total_length: u64, buffers: Vec<PooledBuffer>) -> Self {
        Self {
            filename,
            total_length,
            buffers,
        }
    }

    /// File the content came from
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Number of meaningful bytes
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Staged buffers, in file order
    pub fn buffers(&self) -> &[PooledBuffer] {
        &self.buffers
    }

    /// Split the task into its parts, transferring buffer ownership
    pub fn into_parts(self) -> (PathBuf, u64, Vec<PooledBuffer>) {
        (self.filename, self.total_length, self.buffers)
    }
}

/// Checksum of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumRecord {
    /// File that was checksummed
    pub path: PathBuf,
    /// CRC-32 of its content
    pub checksum: u32,
    /// Content length in bytes
    pub size: u64,
}

impl ChecksumRecord {
    /// Checksum as 8 lowercase hex digits
    pub fn hex(&self) -> String {
        hex::encode(self.checksum.to_be_bytes())
    }
}

/// Pipeline stage a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// Directory enumeration
    Walk,
    /// Opening or reading a file
    Read,
    /// Checksumming staged content
    Checksum,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Walk => write!(f, "walk"),
            FailureStage::Read => write!(f, "read"),
            FailureStage::Checksum => write!(f, "checksum"),
        }
    }
}

/// A file or directory that could not be processed
#[derive(Debug)]
pub struct FileFailure {
    /// Path of the failed file or directory
    pub path: PathBuf,
    /// Where it failed
    pub stage: FailureStage,
    /// Why it failed
    pub error: ScanError,
}

impl FileFailure {
    /// Create a failure record
    pub fn new(path: PathBuf, stage: FailureStage, error: ScanError) -> Self {
        Self { path, stage, error }
    }
}

/// Outcome of a completed scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Directories expanded by the walker
    pub directories_scanned: u64,
    /// Matching files handed to the reader stage
    pub files_discovered: u64,
    /// Files whose checksum was emitted
    pub files_checksummed: u64,
    /// Bytes covered by emitted checksums
    pub bytes_checksummed: u64,
    /// Failures delivered to the error sink
    pub failures: u64,
    /// Wall-clock time from start to drain
    pub elapsed: Duration,
    /// Whether the walk was stopped before it finished
    pub cancelled: bool,
}

impl ScanSummary {
    /// Every discovered file was checksummed and nothing failed
    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.failures == 0 && self.files_checksummed == self.files_discovered
    }
}
