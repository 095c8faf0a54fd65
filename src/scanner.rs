//! Pipeline wiring
//!
//! [`Scanner::run`] starts three stages connected by bounded queues:
//!
//! ```text
//! roots ─► Walker ──(file queue)──► Reader × N ──(checksum queue)──► Checksum × M ─► sink
//!            ▲  │
//!            └──┘ directory backlog
//! ```
//!
//! A full queue blocks its producer, so the number of staged files (and with
//! it the number of pooled buffers in flight) is bounded by the queue
//! capacities and worker counts rather than by the size of the tree.
//!
//! Shutdown is driven by queue closure. The walker drops the file queue sender
//! once its backlog is empty; readers finish what is queued and drop their
//! checksum queue senders; checksum workers drain and exit.
//! [`ScanHandle::wait`] joins all of them.

use crate::error::{Result, ScanError};
use crate::filter::{FileFilter, MatchAll};
use crate::hasher::run_checksum_worker;
use crate::pool::{BufferPool, PoolStats, DEFAULT_MAX_FREE_PER_CLASS, MAX_BUFFER_SIZE};
use crate::reader::{run_reader, FileReader};
use crate::sink::ResultSink;
use crate::source::{FileSource, StdFileSource};
use crate::types::ScanSummary;
use crate::utils;
use crossbeam_channel::bounded;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default chunk size for staging file content (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Most threads either worker pool may have
pub const MAX_WORKERS: usize = 4096;

/// Largest capacity either queue may have; queue slots are allocated up front
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Tuning knobs for a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Reader workers (I/O bound)
    pub reader_workers: usize,
    /// Checksum workers (CPU bound)
    pub checksum_workers: usize,
    /// Bytes per staged buffer, a power of two
    pub chunk_size: usize,
    /// Capacity of the walker → reader queue
    pub file_queue_capacity: usize,
    /// Capacity of the reader → checksum queue
    pub checksum_queue_capacity: usize,
    /// Idle buffers kept per size class per reader shard
    pub max_free_per_class: usize,
    /// Largest file to read in bytes (0 = unlimited)
    pub max_file_size: u64,
    /// Whether to descend into symlinked directories and read symlinked files
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let reader_workers = utils::default_reader_workers();
        let checksum_workers = utils::default_checksum_workers();
        Self {
            reader_workers,
            checksum_workers,
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_queue_capacity: reader_workers * 4,
            checksum_queue_capacity: checksum_workers * 2,
            max_free_per_class: DEFAULT_MAX_FREE_PER_CLASS,
            max_file_size: 0,
            follow_symlinks: false,
        }
    }
}

impl ScanConfig {
    /// Check the configuration for values the pipeline cannot run with
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidConfiguration`] for worker counts or queue
    ///   capacities that are zero or above [`MAX_WORKERS`] /
    ///   [`MAX_QUEUE_CAPACITY`], or a chunk size that is not a power of two
    ///   within the pool's size classes
    pub fn validate(&self) -> Result<()> {
        if self.reader_workers == 0 {
            return Err(ScanError::invalid_config("reader_workers must be at least 1"));
        }
        if self.checksum_workers == 0 {
            return Err(ScanError::invalid_config("checksum_workers must be at least 1"));
        }
        if self.reader_workers > MAX_WORKERS || self.checksum_workers > MAX_WORKERS {
            return Err(ScanError::invalid_config(format!(
                "worker counts must not exceed {} (got {} readers, {} checksum workers)",
                MAX_WORKERS, self.reader_workers, self.checksum_workers
            )));
        }
        if self.file_queue_capacity == 0 || self.checksum_queue_capacity == 0 {
            return Err(ScanError::invalid_config("queue capacities must be at least 1"));
        }
        if self.file_queue_capacity > MAX_QUEUE_CAPACITY
            || self.checksum_queue_capacity > MAX_QUEUE_CAPACITY
        {
            return Err(ScanError::invalid_config(format!(
                "queue capacities must not exceed {}",
                MAX_QUEUE_CAPACITY
            )));
        }
        if !self.chunk_size.is_power_of_two() || self.chunk_size > MAX_BUFFER_SIZE {
            return Err(ScanError::invalid_config(format!(
                "chunk_size must be a power of two no larger than {} (got {})",
                MAX_BUFFER_SIZE, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Upper bound on pooled buffers held at once
    ///
    /// Every reader holds at most one file, the checksum queue holds at most
    /// its capacity, and every checksum worker holds at most one file. Each of
    /// those files needs at most `ceil(largest_file / chunk_size)` buffers.
    pub fn in_flight_bound(&self, largest_file: u64) -> usize {
        let per_file = largest_file.div_ceil(self.chunk_size as u64).max(1) as usize;
        (self.reader_workers + self.checksum_queue_capacity + self.checksum_workers) * per_file
    }
}

/// Cooperative stop signal for a running scan
///
/// Cancelling stops the walker from discovering more files. Work already
/// queued still drains so every buffer is returned.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Live counters shared by all stages
#[derive(Debug, Default)]
pub struct ScanStats {
    directories_scanned: AtomicU64,
    files_discovered: AtomicU64,
    files_checksummed: AtomicU64,
    bytes_checksummed: AtomicU64,
    failures: AtomicU64,
}

impl ScanStats {
    pub(crate) fn record_directory(&self) {
        self.directories_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discovered(&self) {
        self.files_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checksum(&self, bytes: u64) {
        self.files_checksummed.fetch_add(1, Ordering::Relaxed);
        self.bytes_checksummed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot_directories(&self) -> u64 {
        self.directories_scanned.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot_discovered(&self) -> u64 {
        self.files_discovered.load(Ordering::Relaxed)
    }

    /// Summarize the counters
    pub fn summary(&self, elapsed: Duration, cancelled: bool) -> ScanSummary {
        ScanSummary {
            directories_scanned: self.directories_scanned.load(Ordering::Relaxed),
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            files_checksummed: self.files_checksummed.load(Ordering::Relaxed),
            bytes_checksummed: self.bytes_checksummed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed,
            cancelled,
        }
    }
}

/// Builder for [`Scanner`]
///
/// ```rust,no_run
/// use crcscan::{CollectingSink, GlobFilter, ScannerBuilder};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = Arc::new(CollectingSink::new());
/// let scanner = ScannerBuilder::new()
///     .filter(GlobFilter::new(["*.txt"])?)
///     .reader_workers(8)
///     .checksum_workers(4)
///     .sink(sink.clone())
///     .build()?;
///
/// let summary = scanner.run(["./data"])?.wait()?;
/// println!("{} files", summary.files_checksummed);
/// # Ok(())
/// # }
/// ```
pub struct ScannerBuilder {
    config: ScanConfig,
    filter: Arc<dyn FileFilter>,
    source: Arc<dyn FileSource>,
    sink: Option<Arc<dyn ResultSink>>,
}

impl ScannerBuilder {
    /// Start from the default configuration, accepting every file
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
            filter: Arc::new(MatchAll),
            source: Arc::new(StdFileSource),
            sink: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of reader workers
    ///
    /// The default file queue capacity follows this value unless it is set
    /// explicitly afterwards.
    pub fn reader_workers(mut self, count: usize) -> Self {
        self.config.reader_workers = count;
        self.config.file_queue_capacity = count.saturating_mul(4);
        self
    }

    /// Set the number of checksum workers
    ///
    /// The default checksum queue capacity follows this value unless it is set
    /// explicitly afterwards.
    pub fn checksum_workers(mut self, count: usize) -> Self {
        self.config.checksum_workers = count;
        self.config.checksum_queue_capacity = count.saturating_mul(2);
        self
    }

    /// Set the staging chunk size (power of two)
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes;
        self
    }

    /// Set the walker → reader queue capacity
    pub fn file_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.file_queue_capacity = capacity;
        self
    }

    /// Set the reader → checksum queue capacity
    pub fn checksum_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.checksum_queue_capacity = capacity;
        self
    }

    /// Cap idle buffers per size class per shard
    pub fn max_free_per_class(mut self, count: usize) -> Self {
        self.config.max_free_per_class = count;
        self
    }

    /// Skip files larger than `bytes` (0 = unlimited)
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    /// Follow symbolic links
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Select which files are checksummed
    pub fn filter<F: FileFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Replace the file system access layer
    pub fn source<S: FileSource + 'static>(mut self, source: S) -> Self {
        self.source = Arc::new(source);
        self
    }

    /// Where results and failures go
    pub fn sink<S: ResultSink + 'static>(mut self, sink: Arc<S>) -> Self {
        let sink: Arc<dyn ResultSink> = sink;
        self.sink = Some(sink);
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidConfiguration`] if the configuration is invalid or
    ///   no sink was set
    pub fn build(self) -> Result<Scanner> {
        self.config.validate()?;
        let sink = self
            .sink
            .ok_or_else(|| ScanError::invalid_config("a result sink is required"))?;

        Ok(Scanner {
            config: self.config,
            filter: self.filter,
            source: self.source,
            sink,
        })
    }
}

impl Default for ScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured pipeline, runnable any number of times
pub struct Scanner {
    config: ScanConfig,
    filter: Arc<dyn FileFilter>,
    source: Arc<dyn FileSource>,
    sink: Arc<dyn ResultSink>,
}

impl Scanner {
    /// The configuration this scanner runs with
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Start scanning `roots`
    ///
    /// Returns as soon as every worker is running. Each run gets a fresh
    /// buffer pool.
    ///
    /// # Errors
    ///
    /// - [`ScanError::ThreadSpawn`] if a worker thread cannot be started;
    ///   workers already running wind down on their own
    pub fn run<I, P>(&self, roots: I) -> Result<ScanHandle>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();
        let config = &self.config;
        info!(
            "Scanning {} roots with {} readers and {} checksum workers",
            roots.len(),
            config.reader_workers,
            config.checksum_workers
        );

        let started = Instant::now();
        let pool = Arc::new(BufferPool::new(config.reader_workers, config.max_free_per_class));
        let stats = Arc::new(ScanStats::default());
        let cancel = CancelToken::new();

        let (file_tx, file_rx) = bounded(config.file_queue_capacity);
        let (checksum_tx, checksum_rx) = bounded(config.checksum_queue_capacity);

        let mut workers = Vec::with_capacity(1 + config.reader_workers + config.checksum_workers);

        for id in 0..config.checksum_workers {
            let pool = Arc::clone(&pool);
            let sink = Arc::clone(&self.sink);
            let stats = Arc::clone(&stats);
            let tasks = checksum_rx.clone();
            workers.push(spawn_worker(format!("crcscan-checksum-{}", id), move || {
                run_checksum_worker(id, pool, sink, stats, tasks)
            })?);
        }
        drop(checksum_rx);

        let reader = Arc::new(FileReader::new(
            Arc::clone(&self.source),
            config.chunk_size,
            config.max_file_size,
        ));
        for id in 0..config.reader_workers {
            let reader = Arc::clone(&reader);
            let handle = pool.handle(id);
            let sink = Arc::clone(&self.sink);
            let stats = Arc::clone(&stats);
            let tasks = file_rx.clone();
            let output = checksum_tx.clone();
            workers.push(spawn_worker(format!("crcscan-reader-{}", id), move || {
                run_reader(id, reader, handle, sink, stats, tasks, output)
            })?);
        }
        drop(file_rx);
        drop(checksum_tx);

        let walker = crate::walker::Walker {
            filter: Arc::clone(&self.filter),
            sink: Arc::clone(&self.sink),
            stats: Arc::clone(&stats),
            cancel: cancel.clone(),
            follow_symlinks: config.follow_symlinks,
        };
        workers.push(spawn_worker("crcscan-walker".to_string(), move || {
            walker.run(roots, file_tx)
        })?);

        Ok(ScanHandle {
            workers,
            pool,
            stats,
            cancel,
            started,
        })
    }
}

fn spawn_worker<F>(name: String, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|e| ScanError::ThreadSpawn(format!("{}: {}", name, e)))
}

/// A running scan
pub struct ScanHandle {
    workers: Vec<JoinHandle<()>>,
    pool: Arc<BufferPool>,
    stats: Arc<ScanStats>,
    cancel: CancelToken,
    started: Instant,
}

impl ScanHandle {
    /// Stop discovering new files; queued work still drains
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this scan from elsewhere
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Counters so far
    pub fn progress(&self) -> ScanSummary {
        self.stats
            .summary(self.started.elapsed(), self.cancel.is_cancelled())
    }

    /// Buffer pool counters so far
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// The pool this scan stages buffers in
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Whether every worker has exited
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(JoinHandle::is_finished)
    }

    /// Block until all discovered work has drained
    ///
    /// # Errors
    ///
    /// - [`ScanError::WorkerPanicked`] if any worker panicked; the remaining
    ///   workers are still joined first
    pub fn wait(self) -> Result<ScanSummary> {
        let mut panicked = Vec::new();
        for worker in self.workers {
            let name = worker.thread().name().unwrap_or("crcscan-worker").to_string();
            if worker.join().is_err() {
                warn!("Worker {} panicked", name);
                panicked.push(name);
            }
        }

        if !panicked.is_empty() {
            return Err(ScanError::WorkerPanicked(panicked.join(", ")));
        }

        let summary = self
            .stats
            .summary(self.started.elapsed(), self.cancel.is_cancelled());
        let pool = self.pool.stats();
        debug!(
            "Pool: {} created, {} reused, {} discarded, peak {} outstanding",
            pool.created, pool.reused, pool.discarded, pool.peak_outstanding
        );
        info!(
            "Checksummed {} of {} files ({}) in {:?}, {} failures",
            summary.files_checksummed,
            summary.files_discovered,
            utils::format_bytes(summary.bytes_checksummed),
            summary.elapsed,
            summary.failures
        );
        Ok(summary)
    }
}
