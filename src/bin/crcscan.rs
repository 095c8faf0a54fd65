//! # crcscan CLI
//!
//! Prints a CRC-32 for every matching file under the given roots.
//!
//! ## Usage
//! ```bash
//! # Checksum every file under two trees
//! crcscan ./data ./backup
//!
//! # Only text files, with progress, as JSON lines
//! crcscan ./data -e txt --progress --format json
//!
//! # Glob selection and tuned pipeline
//! crcscan /mnt/share -p '*.log' -p 'dump_*.bin' --readers 32 --chunk-size 128K
//! ```
//!
//! Failures for individual files go to stderr and the scan continues. The exit
//! status is 0 when every file was checksummed, 2 when some failed and 1 when
//! the scan could not run at all.

use clap::{Parser, ValueEnum};
use colored::*;
use crcscan::utils::{format_bytes, parse_size};
use crcscan::{
    CancelToken, ChecksumRecord, ExtensionFilter, FileFailure, FileFilter, GlobFilter, MatchAll,
    Result, ResultSink, ScanError, ScanSummary, ScannerBuilder,
};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// crcscan - CRC-32 checksums for large directory trees
#[derive(Parser)]
#[command(name = "crcscan")]
#[command(version)]
#[command(about = "Compute CRC-32 checksums for every matching file under the given directories")]
#[command(long_about = None)]
struct Cli {
    /// Directories (or files) to scan
    #[arg(required = true)]
    roots: Vec<PathBuf>,

    /// Only checksum files whose name matches this glob (repeatable)
    #[arg(short, long = "pattern")]
    patterns: Vec<String>,

    /// Only checksum files with this extension (repeatable)
    #[arg(short, long = "extension")]
    extensions: Vec<String>,

    /// Reader workers (defaults to twice the core count)
    #[arg(long)]
    readers: Option<usize>,

    /// Checksum workers (defaults to the core count)
    #[arg(long)]
    hashers: Option<usize>,

    /// Bytes per read buffer, a power of two (e.g. 64K)
    #[arg(long, value_parser = parse_size_arg)]
    chunk_size: Option<u64>,

    /// Capacity of the file queue
    #[arg(long)]
    file_queue: Option<usize>,

    /// Capacity of the checksum queue
    #[arg(long)]
    checksum_queue: Option<usize>,

    /// Idle buffers kept per size class per reader
    #[arg(long)]
    pool_cap: Option<usize>,

    /// Skip files larger than this (e.g. 512M)
    #[arg(long, value_parser = parse_size_arg)]
    max_file_size: Option<u64>,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Show a progress spinner on stderr
    #[arg(long)]
    progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_size_arg(input: &str) -> std::result::Result<u64, String> {
    parse_size(input).ok_or_else(|| format!("invalid size '{}'", input))
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(summary) if summary.is_complete_success() => {}
        Ok(_) => std::process::exit(2),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<ScanSummary> {
    let progress = cli.progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} files {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    });

    let sink = Arc::new(ConsoleSink::new(cli.format, progress.clone()));

    let mut builder = ScannerBuilder::new()
        .filter(build_filter(&cli.patterns, &cli.extensions)?)
        .follow_symlinks(cli.follow_symlinks)
        .sink(Arc::clone(&sink));

    if let Some(readers) = cli.readers {
        builder = builder.reader_workers(readers);
    }
    if let Some(hashers) = cli.hashers {
        builder = builder.checksum_workers(hashers);
    }
    if let Some(chunk_size) = cli.chunk_size {
        let chunk_size = usize::try_from(chunk_size)
            .map_err(|_| ScanError::invalid_config("chunk size does not fit in memory"))?;
        builder = builder.chunk_size(chunk_size);
    }
    if let Some(capacity) = cli.file_queue {
        builder = builder.file_queue_capacity(capacity);
    }
    if let Some(capacity) = cli.checksum_queue {
        builder = builder.checksum_queue_capacity(capacity);
    }
    if let Some(cap) = cli.pool_cap {
        builder = builder.max_free_per_class(cap);
    }
    if let Some(limit) = cli.max_file_size {
        builder = builder.max_file_size(limit);
    }

    let scanner = builder.build()?;
    let handle = scanner.run(cli.roots)?;
    sink.attach(handle.cancel_token());
    let summary = handle.wait()?;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    print_summary(&summary);
    Ok(summary)
}

type BoxedFilter = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Combine glob and extension selection; no selection means every file
fn build_filter(patterns: &[String], extensions: &[String]) -> Result<BoxedFilter> {
    let globs = if patterns.is_empty() {
        None
    } else {
        Some(GlobFilter::new(patterns)?)
    };
    let exts = (!extensions.is_empty()).then(|| ExtensionFilter::new(extensions));

    Ok(match (globs, exts) {
        (None, None) => Box::new(|path: &Path| MatchAll.matches(path)),
        (Some(globs), None) => Box::new(move |path: &Path| globs.matches(path)),
        (None, Some(exts)) => Box::new(move |path: &Path| exts.matches(path)),
        (Some(globs), Some(exts)) => {
            Box::new(move |path: &Path| globs.matches(path) || exts.matches(path))
        }
    })
}

/// Writes results to stdout and failures to stderr
///
/// Once stdout can no longer be written (e.g. the reading end of a pipe went
/// away) the sink stops writing and cancels the scan.
struct ConsoleSink {
    format: OutputFormat,
    progress: Option<ProgressBar>,
    stdout_closed: AtomicBool,
    cancel: Mutex<Option<CancelToken>>,
}

impl ConsoleSink {
    fn new(format: OutputFormat, progress: Option<ProgressBar>) -> Self {
        Self {
            format,
            progress,
            stdout_closed: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Bind the running scan so a closed stdout can stop it
    fn attach(&self, token: CancelToken) {
        *self.cancel.lock() = Some(token.clone());
        if self.stdout_closed.load(Ordering::SeqCst) {
            token.cancel();
        }
    }

    fn emit(&self, line: String, to_stderr: bool) {
        if !to_stderr && self.stdout_closed.load(Ordering::SeqCst) {
            return;
        }
        let write = || {
            if to_stderr {
                eprintln!("{}", line);
            } else {
                let mut stdout = io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{}", line) {
                    self.stdout_failed(e);
                }
            }
        };
        match &self.progress {
            Some(bar) => bar.suspend(write),
            None => write(),
        }
    }

    fn stdout_failed(&self, error: io::Error) {
        if self.stdout_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if error.kind() == io::ErrorKind::BrokenPipe {
            debug!("stdout closed, cancelling scan");
        } else {
            warn!("Cannot write to stdout, cancelling scan: {}", error);
        }
        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }
    }
}

impl ResultSink for ConsoleSink {
    fn record(&self, record: ChecksumRecord) {
        let line = match self.format {
            OutputFormat::Text => format!("{}  {}", record.hex(), record.path.display()),
            OutputFormat::Json => serde_json::json!({
                "path": record.path,
                "crc32": record.hex(),
                "size": record.size,
            })
            .to_string(),
        };
        self.emit(line, false);
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }
    }

    fn failure(&self, failure: FileFailure) {
        let line = match self.format {
            OutputFormat::Text => format!(
                "{} [{}] {}: {}",
                "✗".red().bold(),
                failure.stage,
                failure.path.display(),
                failure.error.user_message()
            ),
            OutputFormat::Json => serde_json::json!({
                "path": failure.path,
                "stage": failure.stage,
                "error": failure.error.to_string(),
            })
            .to_string(),
        };
        self.emit(line, true);
    }
}

fn print_summary(summary: &ScanSummary) {
    let elapsed = Duration::from_millis(summary.elapsed.as_millis() as u64);
    let status = if summary.is_complete_success() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    eprintln!(
        "{} {} files ({}) in {} across {} directories",
        status,
        summary.files_checksummed,
        format_bytes(summary.bytes_checksummed),
        format_duration(elapsed),
        summary.directories_scanned
    );
    if summary.failures > 0 {
        eprintln!("  {} failures", summary.failures.to_string().red());
    }
    if summary.cancelled {
        eprintln!("  {}", "scan cancelled before completion".yellow());
    }
}
