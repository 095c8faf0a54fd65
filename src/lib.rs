//! # crcscan - concurrent CRC-32 scanning of large directory trees
//!
//! crcscan walks one or more directory trees, reads every matching file and
//! reports a CRC-32 for each, using bounded memory no matter how many files the
//! trees contain.
//!
//! ## Architecture
//!
//! The scan is a three-stage pipeline connected by bounded queues:
//!
//! - **Walker**: a single thread expanding directories from an explicit
//!   backlog and queueing matching files
//! - **Readers**: a pool of I/O workers staging file content into recycled,
//!   power-of-two sized buffers
//! - **Checksum workers**: a pool of CPU workers running CRC-32 over the
//!   staged buffers and returning them to the pool
//!
//! Full queues block their producers, which caps the buffers in flight at a
//! function of queue capacities and worker counts. The [`pool::BufferPool`]
//! keeps one shard per reader so readers never contend with each other, and
//! caps how many idle buffers each shard retains.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crcscan::{CollectingSink, ExtensionFilter, ScannerBuilder};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(CollectingSink::new());
//! let scanner = ScannerBuilder::new()
//!     .filter(ExtensionFilter::new(["txt"]))
//!     .sink(sink.clone())
//!     .build()?;
//!
//! let handle = scanner.run(["./logs", "./archive"])?;
//! let summary = handle.wait()?;
//!
//! for record in sink.records() {
//!     println!("{}  {}", record.hex(), record.path.display());
//! }
//! println!("{} files, {} failures", summary.files_checksummed, summary.failures);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Failures on individual files and directories are delivered to the
//! [`ResultSink`] and never stop the scan. Only configuration errors, thread
//! failures and oversized buffer requests surface as `Err` from the API.
//!
//! ## Module Organization
//!
//! - [`checksum`]: CRC-32 engine over chunked buffers
//! - [`pool`]: power-of-two buffer pool
//! - [`scanner`]: configuration, builder and pipeline wiring
//! - [`filter`]: file selection
//! - [`sink`]: result delivery
//! - [`source`]: raw file access
//! - [`types`]: work items and results
//! - [`error`]: error types

pub mod checksum;
pub mod error;
pub mod filter;
pub mod hasher;
pub mod pool;
pub mod reader;
pub mod scanner;
pub mod sink;
pub mod source;
pub mod types;
pub mod utils;

mod walker;

pub use error::{Result, ScanError};
pub use filter::{ExtensionFilter, FileFilter, GlobFilter, MatchAll};
pub use pool::{BufferPool, PoolHandle, PoolStats, PooledBuffer};
pub use scanner::{CancelToken, ScanConfig, ScanHandle, ScanStats, Scanner, ScannerBuilder};
pub use sink::{CollectingSink, ResultSink};
pub use source::{FileSource, SourceFile, StdFileSource};
pub use types::*;
