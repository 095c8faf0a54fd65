//! Checksum stage
//!
//! Checksum workers take staged files off the checksum queue, run the CRC
//! engine over their buffers and emit the result. Every buffer goes back to
//! the pool before the result is emitted, whether or not the task was sound.

use crate::checksum::{capacity, compute};
use crate::error::{Result, ScanError};
use crate::pool::BufferPool;
use crate::scanner::ScanStats;
use crate::sink::ResultSink;
use crate::types::{ChecksumRecord, ChecksumTask, FailureStage, FileFailure};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Checksum a staged file and return its buffers to `pool`
///
/// # Errors
///
/// - [`ScanError::MalformedTask`] if the buffers hold fewer bytes than the
///   task declares; the buffers are still released
pub fn checksum_task(pool: &BufferPool, task: ChecksumTask) -> Result<ChecksumRecord> {
    let (path, total_length, buffers) = task.into_parts();
    let staged = capacity(&buffers);

    let outcome = if staged >= total_length {
        Ok(compute(&buffers, total_length))
    } else {
        Err(staged)
    };

    pool.release_all(buffers);

    match outcome {
        Ok(checksum) => Ok(ChecksumRecord {
            path,
            checksum,
            size: total_length,
        }),
        Err(staged) => Err(ScanError::MalformedTask {
            path,
            total_length,
            capacity: staged,
        }),
    }
}

/// One checksum worker's loop
///
/// Runs until every reader has dropped its sender and the queue is drained.
pub(crate) fn run_checksum_worker(
    id: usize,
    pool: Arc<BufferPool>,
    sink: Arc<dyn ResultSink>,
    stats: Arc<ScanStats>,
    tasks: Receiver<ChecksumTask>,
) {
    debug!("Checksum worker {} started", id);

    for task in tasks.iter() {
        let path = task.filename().to_path_buf();
        match checksum_task(&pool, task) {
            Ok(record) => {
                trace!("{:?} -> {:08x}", record.path, record.checksum);
                stats.record_checksum(record.size);
                sink.record(record);
            }
            Err(error) => {
                warn!("Discarding task for {:?}: {}", path, error);
                stats.record_failure();
                sink.failure(FileFailure::new(path, FailureStage::Checksum, error));
            }
        }
    }

    debug!("Checksum worker {} exiting", id);
}
