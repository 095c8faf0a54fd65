//! Result and error sinks
//!
//! The checksum stage hands every result to a [`ResultSink`]; every stage
//! hands per-file failures to the same sink. Sinks are shared by all workers,
//! so implementations must be thread-safe.

use crate::types::{ChecksumRecord, FileFailure};
use parking_lot::Mutex;

/// Receiver of scan results and per-file failures
pub trait ResultSink: Send + Sync {
    /// A file was checksummed
    fn record(&self, record: ChecksumRecord);

    /// A file or directory could not be processed
    fn failure(&self, failure: FileFailure);
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<ChecksumRecord>>,
    failures: Mutex<Vec<FileFailure>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the records received so far, sorted by path
    pub fn records(&self) -> Vec<ChecksumRecord> {
        let mut records = self.records.lock().clone();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Take the failures received so far
    pub fn take_failures(&self) -> Vec<FileFailure> {
        std::mem::take(&mut *self.failures.lock())
    }

    /// Number of records received
    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Number of failures received
    pub fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }
}

impl ResultSink for CollectingSink {
    fn record(&self, record: ChecksumRecord) {
        self.records.lock().push(record);
    }

    fn failure(&self, failure: FileFailure) {
        self.failures.lock().push(failure);
    }
}
