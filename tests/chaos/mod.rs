//! Chaos tests for crcscan
//!
//! Files vanish between discovery and open, reads fail halfway, consumers
//! stall and scans get cancelled mid-flight. Through all of it every buffer
//! must find its way back to the pool and every discovered file must end up
//! either checksummed or reported.

use ::crcscan::*;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

/// File source that injects failures into selected files
pub struct ChaosSource {
    /// Files whose name starts with this prefix fail after the first read
    pub fail_prefix: &'static str,
    /// Delay before each open
    pub open_delay: Duration,
    pub opened: AtomicUsize,
}

impl ChaosSource {
    pub fn new(fail_prefix: &'static str) -> Self {
        Self {
            fail_prefix,
            open_delay: Duration::ZERO,
            opened: AtomicUsize::new(0),
        }
    }
}

struct ChaosFile {
    inner: File,
    fail: bool,
    reads: usize,
}

impl FileSource for ChaosSource {
    fn open(&self, path: &Path) -> io::Result<Box<dyn SourceFile>> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        let fail = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(self.fail_prefix))
            .unwrap_or(false);
        Ok(Box::new(ChaosFile {
            inner: File::open(path)?,
            fail,
            reads: 0,
        }))
    }
}

impl SourceFile for ChaosFile {
    fn len(&self) -> io::Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if self.fail && self.reads > 1 {
            return Err(io::Error::other("injected device error"));
        }
        self.inner.read(buf)
    }
}

/// Sink that stalls on every record to back up the pipeline
pub struct StallingSink {
    pub inner: CollectingSink,
    pub delay: Duration,
}

impl ResultSink for StallingSink {
    fn record(&self, record: ChecksumRecord) {
        std::thread::sleep(self.delay);
        self.inner.record(record);
    }

    fn failure(&self, failure: FileFailure) {
        self.inner.failure(failure);
    }
}

/// Write `count` files of `size` bytes each into `dir`
pub fn populate(dir: &Path, count: usize, size: usize) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(format!("file_{:04}.bin", i));
            let content: Vec<u8> = (0..size).map(|b| (b * 31 + i) as u8).collect();
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_file_deleted_before_open() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), 10, 500);
        let doomed = temp_dir.path().join("doomed.txt");
        fs::write(&doomed, "gone soon").unwrap();

        // The walker consults the filter right before queueing, so deleting
        // here lands between enumeration and the reader's open.
        let filter = |path: &Path| {
            if path.file_name().is_some_and(|n| n == "doomed.txt") {
                let _ = fs::remove_file(path);
            }
            true
        };

        let sink = Arc::new(CollectingSink::new());
        let handle = ScannerBuilder::new()
            .reader_workers(2)
            .checksum_workers(2)
            .chunk_size(256)
            .filter(filter)
            .sink(sink.clone())
            .build()
            .unwrap()
            .run([temp_dir.path()])
            .unwrap();
        let pool = Arc::clone(handle.pool());
        let summary = handle.wait().unwrap();

        assert_eq!(summary.files_discovered, 11);
        assert_eq!(summary.files_checksummed, 10);
        assert_eq!(summary.failures, 1);

        let failures = sink.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, doomed);
        assert_eq!(failures[0].stage, FailureStage::Read);
        assert!(matches!(failures[0].error, ScanError::FileRead { .. }));

        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_read_failures_release_buffers() {
        let temp_dir = TempDir::new().unwrap();
        populate(&temp_dir.path().join("good"), 20, 3000);
        let bad_dir = temp_dir.path().join("bad");
        fs::create_dir(&bad_dir).unwrap();
        for i in 0..5 {
            fs::write(bad_dir.join(format!("bad_{}.bin", i)), vec![9u8; 3000]).unwrap();
        }

        let sink = Arc::new(CollectingSink::new());
        let handle = ScannerBuilder::new()
            .reader_workers(3)
            .checksum_workers(2)
            .chunk_size(1024)
            .source(ChaosSource::new("bad_"))
            .sink(sink.clone())
            .build()
            .unwrap()
            .run([temp_dir.path()])
            .unwrap();
        let pool = Arc::clone(handle.pool());
        let summary = handle.wait().unwrap();

        assert_eq!(summary.files_checksummed, 20);
        assert_eq!(summary.failures, 5);
        for failure in sink.take_failures() {
            assert_eq!(failure.stage, FailureStage::Read);
            assert!(failure.path.starts_with(&bad_dir));
            assert!(failure.error.is_recoverable());
        }

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert!(stats.released + stats.discarded >= stats.created);
    }

    #[test]
    fn test_cancellation_drains_queued_work() {
        let temp_dir = TempDir::new().unwrap();
        let total = 400;
        populate(temp_dir.path(), total, 64);

        let mut source = ChaosSource::new("never");
        source.open_delay = Duration::from_millis(2);

        let sink = Arc::new(CollectingSink::new());
        let handle = ScannerBuilder::new()
            .reader_workers(1)
            .checksum_workers(1)
            .file_queue_capacity(2)
            .source(source)
            .sink(sink.clone())
            .build()
            .unwrap()
            .run([temp_dir.path()])
            .unwrap();

        handle.cancel_token().cancel();
        let pool = Arc::clone(handle.pool());
        let summary = handle.wait().unwrap();

        info!("Cancelled after {} files", summary.files_checksummed);
        assert!(summary.cancelled);
        assert!(summary.files_checksummed < total as u64);
        // Everything that was queued was still processed
        assert_eq!(
            summary.files_checksummed + summary.failures,
            summary.files_discovered
        );
        assert_eq!(sink.record_count() as u64, summary.files_checksummed);
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_memory_bounded_by_configuration() {
        let temp_dir = TempDir::new().unwrap();
        let file_size = 3000;
        populate(temp_dir.path(), 60, file_size);

        let config = ScanConfig {
            reader_workers: 2,
            checksum_workers: 1,
            chunk_size: 1024,
            file_queue_capacity: 4,
            checksum_queue_capacity: 1,
            max_free_per_class: 4,
            ..Default::default()
        };
        let bound = config.in_flight_bound(file_size as u64);

        let mut peaks = Vec::new();
        for replays in [1, 3, 6] {
            let sink = Arc::new(StallingSink {
                inner: CollectingSink::new(),
                delay: Duration::from_micros(200),
            });
            let roots = vec![temp_dir.path().to_path_buf(); replays];
            let handle = ScannerBuilder::new()
                .config(config.clone())
                .sink(sink.clone())
                .build()
                .unwrap()
                .run(roots)
                .unwrap();
            let pool = Arc::clone(handle.pool());
            let summary = handle.wait().unwrap();

            assert_eq!(summary.files_checksummed, 60 * replays as u64);
            let stats = pool.stats();
            assert_eq!(stats.outstanding, 0);
            assert!(
                stats.peak_outstanding <= bound,
                "peak {} exceeds bound {} with {} replays",
                stats.peak_outstanding,
                bound,
                replays
            );
            // Idle buffers never exceed the per-class cap on any shard
            assert!(pool.retained() <= config.reader_workers * config.max_free_per_class);
            peaks.push(stats.peak_outstanding);
        }

        info!("Peak buffers in flight per replay count: {:?}", peaks);
    }

    #[test]
    fn test_concurrent_scans_share_nothing() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), 30, 2048);
        let root = temp_dir.path().to_path_buf();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || {
                    let sink = Arc::new(CollectingSink::new());
                    let summary = ScannerBuilder::new()
                        .reader_workers(2)
                        .checksum_workers(1)
                        .chunk_size(512)
                        .sink(sink.clone())
                        .build()
                        .unwrap()
                        .run([root])
                        .unwrap()
                        .wait()
                        .unwrap();
                    (summary, sink.records())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (summary, records) in &results {
            assert_eq!(summary.files_checksummed, 30);
            assert_eq!(records, &results[0].1);
        }
    }
}
