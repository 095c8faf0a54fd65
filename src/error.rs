//! Error types for the crcscan library
//!
//! This module defines all error types that can occur while scanning. Errors
//! fall into three families:
//!
//! - **Traversal errors**: a directory could not be enumerated. The subtree is
//!   skipped and the failure reported.
//! - **File I/O errors**: a file could not be opened or read. Buffers already
//!   staged for it are returned to the pool and the failure reported.
//! - **Contract violations and fatal conditions**: oversized buffer requests,
//!   malformed tasks, invalid configuration, thread failures.
//!
//! Only the last family can abort a run; everything else is delivered to the
//! error sink and processing continues.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the crcscan library
pub type Result<T> = std::result::Result<T, ScanError>;

/// Main error type for all crcscan operations
#[derive(Debug, Error)]
pub enum ScanError {
    /// I/O errors without a more specific context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory enumeration failed
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Opening or reading a specific file failed
    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        /// File being read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The file ended before its reported length was consumed
    #[error("File truncated during read: {path:?} (expected {expected} bytes, got {actual})")]
    TruncatedRead {
        /// File being read
        path: PathBuf,
        /// Length reported when the file was opened
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// File too large for configured limits
    #[error("File too large: {path:?} ({size} bytes exceeds limit of {limit} bytes)")]
    FileTooLarge {
        /// Path to the file
        path: PathBuf,
        /// Actual file size
        size: u64,
        /// Configured size limit
        limit: u64,
    },

    /// A buffer larger than the largest size class was requested
    #[error("Buffer request of {requested} bytes exceeds the largest size class ({max} bytes)")]
    BufferTooLarge {
        /// Requested minimum size
        requested: usize,
        /// Largest supported buffer
        max: usize,
    },

    /// A checksum task whose buffers cannot hold its declared length
    #[error("Malformed task for {path:?}: {total_length} bytes declared, {capacity} bytes staged")]
    MalformedTask {
        /// File the task describes
        path: PathBuf,
        /// Declared logical length
        total_length: u64,
        /// Sum of buffer lengths
        capacity: u64,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid file pattern: {0}")]
    InvalidPattern(String),

    /// A pipeline worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(String),

    /// A pipeline worker thread panicked
    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),
}

impl From<globset::Error> for ScanError {
    fn from(err: globset::Error) -> Self {
        ScanError::InvalidPattern(err.to_string())
    }
}

impl ScanError {
    /// Create a configuration error with a custom message
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ScanError::InvalidConfiguration(msg.into())
    }

    /// Wrap an I/O error with the path of the file it concerns
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Check if this error only affects a single file or directory
    ///
    /// Recoverable errors are reported to the error sink and the run
    /// continues. Everything else terminates the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::Io(_)
                | ScanError::WalkDir(_)
                | ScanError::FileRead { .. }
                | ScanError::TruncatedRead { .. }
                | ScanError::FileTooLarge { .. }
                | ScanError::MalformedTask { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            ScanError::FileRead { path, source }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                format!(
                    "Permission denied for {:?}. Check file permissions or run with appropriate privileges.",
                    path
                )
            }
            ScanError::FileTooLarge { path, size, limit } => {
                format!(
                    "File {:?} is too large ({} bytes). Maximum allowed size is {} bytes. \
                     Raise --max-file-size or exclude the file.",
                    path, size, limit
                )
            }
            ScanError::TruncatedRead { path, .. } => {
                format!("File {:?} changed while it was being read. Re-run the scan.", path)
            }
            _ => self.to_string(),
        }
    }
}
