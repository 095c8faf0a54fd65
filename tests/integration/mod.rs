//! End-to-end integration tests for crcscan
//!
//! Builds real directory trees on disk, scans them through the full pipeline
//! and checks every checksum against an independent CRC-32 implementation.

use ::crcscan::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// A directory tree with known contents
pub struct ScanFixture {
    pub temp_dir: TempDir,
    /// Expected CRC-32 for every file written
    pub expected: BTreeMap<PathBuf, u32>,
}

impl ScanFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            expected: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file relative to the root, creating parents
    pub fn write(&mut self, relative: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        self.expected.insert(path.clone(), crc32fast::hash(content));
        Ok(path)
    }

    /// Fill the tree with random files
    pub fn generate(&mut self, config: TreeConfig) -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        for dir in 0..config.dirs {
            for file in 0..config.files_per_dir {
                let size = rng.random_range(config.file_size_range.clone());
                let mut content = vec![0u8; size];
                rng.fill(&mut content[..]);
                self.write(&format!("dir_{}/nested_{}/file_{}.bin", dir, dir % 3, file), &content)?;
            }
        }
        info!("Generated {} files", self.expected.len());
        Ok(())
    }
}

/// Shape of a generated tree
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub seed: u64,
    pub dirs: usize,
    pub files_per_dir: usize,
    pub file_size_range: std::ops::Range<usize>,
}

/// A scanner with small worker counts and the given chunk size
pub fn small_scanner(sink: Arc<CollectingSink>, chunk_size: usize) -> Scanner {
    ScannerBuilder::new()
        .reader_workers(3)
        .checksum_workers(2)
        .chunk_size(chunk_size)
        .sink(sink)
        .build()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_mixed_tree_scan() {
        let mut fixture = ScanFixture::new();
        let chunk = 4096;

        let empty = fixture.write("a.txt", b"").unwrap();
        let abc = fixture.write("b.txt", b"abc").unwrap();
        let mut large = vec![0u8; 3 * chunk];
        StdRng::seed_from_u64(7).fill(&mut large[..]);
        let multi = fixture.write("sub/c.txt", &large).unwrap();

        let sink = Arc::new(CollectingSink::new());
        let handle = small_scanner(sink.clone(), chunk).run([fixture.root()]).unwrap();
        let pool = Arc::clone(handle.pool());
        let summary = handle.wait().unwrap();

        let records: BTreeMap<_, _> = sink
            .records()
            .into_iter()
            .map(|r| (r.path.clone(), r))
            .collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[&empty].checksum, 0x0000_0000);
        assert_eq!(records[&empty].size, 0);
        assert_eq!(records[&abc].checksum, 0x3524_41c2);
        assert_eq!(records[&abc].hex(), "352441c2");
        assert_eq!(records[&multi].checksum, crc32fast::hash(&large));
        assert_eq!(records[&multi].size, 3 * chunk as u64);

        assert_eq!(summary.directories_scanned, 2);
        assert_eq!(summary.files_discovered, 3);
        assert_eq!(summary.files_checksummed, 3);
        assert_eq!(summary.bytes_checksummed, 3 + 3 * chunk as u64);
        assert_eq!(summary.failures, 0);
        assert!(!summary.cancelled);
        assert_eq!(sink.failure_count(), 0);

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert!(stats.created >= 4);
    }

    #[test]
    #[traced_test]
    fn test_random_tree_matches_reference() {
        let mut fixture = ScanFixture::new();
        fixture.generate(TreeConfig {
            seed: 42,
            dirs: 6,
            files_per_dir: 15,
            file_size_range: 0..20_000,
        }).unwrap();

        let sink = Arc::new(CollectingSink::new());
        let summary = small_scanner(sink.clone(), 1024)
            .run([fixture.root()])
            .unwrap()
            .wait()
            .unwrap();

        assert!(summary.is_complete_success());
        assert_eq!(summary.files_checksummed, fixture.expected.len() as u64);

        let actual: BTreeMap<_, _> = sink
            .records()
            .into_iter()
            .map(|r| (r.path, r.checksum))
            .collect();
        assert_eq!(actual, fixture.expected);
    }

    #[test]
    fn test_multiple_and_duplicate_roots() -> anyhow::Result<()> {
        let mut left = ScanFixture::new();
        let mut right = ScanFixture::new();
        left.write("l.txt", b"left")?;
        right.write("r/r.txt", b"right")?;

        let sink = Arc::new(CollectingSink::new());
        let summary = small_scanner(sink.clone(), 1024)
            .run([left.root(), right.root(), left.root()])
            .unwrap()
            .wait()
            .unwrap();

        // A root listed twice is walked twice
        assert_eq!(summary.files_checksummed, 3);
        let records = sink.records();
        assert_eq!(
            records.iter().filter(|r| r.path == left.root().join("l.txt")).count(),
            2
        );
        assert!(records.iter().any(|r| r.checksum == crc32fast::hash(b"right")));
        Ok(())
    }

    #[test]
    fn test_file_roots_bypass_filter() -> anyhow::Result<()> {
        let mut fixture = ScanFixture::new();
        let direct = fixture.write("direct.dat", b"direct")?;
        fixture.write("tree/keep.txt", b"keep")?;
        fixture.write("tree/skip.dat", b"skip")?;

        let sink = Arc::new(CollectingSink::new());
        let summary = ScannerBuilder::new()
            .reader_workers(2)
            .checksum_workers(1)
            .filter(ExtensionFilter::new(["txt"]))
            .sink(sink.clone())
            .build()
            .unwrap()
            .run([direct.clone(), fixture.root().join("tree")])
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(summary.files_checksummed, 2);
        let paths: Vec<_> = sink.records().into_iter().map(|r| r.path).collect();
        assert!(paths.contains(&direct));
        assert!(paths.contains(&fixture.root().join("tree/keep.txt")));
        Ok(())
    }

    #[test]
    fn test_glob_filter_end_to_end() -> anyhow::Result<()> {
        let mut fixture = ScanFixture::new();
        fixture.write("logs/app.log", b"log line")?;
        fixture.write("logs/app.log.1", b"rotated")?;
        fixture.write("dump_01.bin", b"dump")?;
        fixture.write("notes.md", b"notes")?;

        let sink = Arc::new(CollectingSink::new());
        let summary = ScannerBuilder::new()
            .filter(GlobFilter::new(["*.log", "dump_*.bin"]).unwrap())
            .sink(sink.clone())
            .build()
            .unwrap()
            .run([fixture.root()])
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(summary.files_discovered, 2);
        let names: Vec<_> = sink
            .records()
            .into_iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["dump_01.bin", "app.log"]);
        Ok(())
    }

    #[test]
    fn test_missing_root_is_reported() -> anyhow::Result<()> {
        let mut fixture = ScanFixture::new();
        fixture.write("present.txt", b"here")?;
        let missing = fixture.root().join("missing");

        let sink = Arc::new(CollectingSink::new());
        let summary = small_scanner(sink.clone(), 1024)
            .run([missing.clone(), fixture.root().to_path_buf()])
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(summary.files_checksummed, 1);
        assert_eq!(summary.failures, 1);
        assert!(!summary.is_complete_success());

        let failures = sink.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, FailureStage::Walk);
        assert_eq!(failures[0].path, missing);
        Ok(())
    }

    #[test]
    fn test_size_limit_reports_and_continues() -> anyhow::Result<()> {
        let mut fixture = ScanFixture::new();
        fixture.write("small.bin", &[1u8; 100])?;
        let big = fixture.write("big.bin", &[2u8; 5000])?;

        let sink = Arc::new(CollectingSink::new());
        let summary = ScannerBuilder::new()
            .max_file_size(4096)
            .sink(sink.clone())
            .build()
            .unwrap()
            .run([fixture.root()])
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(summary.files_checksummed, 1);
        let failures = sink.take_failures();
        assert_eq!(failures[0].path, big);
        assert_eq!(failures[0].stage, FailureStage::Read);
        assert!(matches!(
            failures[0].error,
            ScanError::FileTooLarge { size: 5000, limit: 4096, .. }
        ));
        Ok(())
    }

    #[test]
    fn test_scanner_is_reusable() -> anyhow::Result<()> {
        let mut fixture = ScanFixture::new();
        fixture.write("one.txt", b"1")?;
        fixture.write("two.txt", b"2")?;

        let sink = Arc::new(CollectingSink::new());
        let scanner = small_scanner(sink.clone(), 1024);

        let first = scanner.run([fixture.root()]).unwrap().wait().unwrap();
        fixture.write("three.txt", b"3")?;
        let second = scanner.run([fixture.root()]).unwrap().wait().unwrap();

        assert_eq!(first.files_checksummed, 2);
        assert_eq!(second.files_checksummed, 3);
        assert_eq!(sink.record_count(), 5);
        Ok(())
    }

    #[test]
    fn test_progress_and_pool_after_completion() -> anyhow::Result<()> {
        let mut fixture = ScanFixture::new();
        fixture.generate(TreeConfig {
            seed: 9,
            dirs: 2,
            files_per_dir: 10,
            file_size_range: 1..3000,
        })?;

        let sink = Arc::new(CollectingSink::new());
        let handle = small_scanner(sink, 1024).run([fixture.root()]).unwrap();
        while !handle.is_finished() {
            std::thread::yield_now();
        }

        let progress = handle.progress();
        assert_eq!(progress.files_checksummed, 20);
        assert_eq!(handle.pool_stats().outstanding, 0);

        let summary = handle.wait().unwrap();
        assert_eq!(summary.files_checksummed, progress.files_checksummed);
        Ok(())
    }

    #[test]
    fn test_records_serialize() -> anyhow::Result<()> {
        let mut fixture = ScanFixture::new();
        let path = fixture.write("b.txt", b"abc")?;

        let sink = Arc::new(CollectingSink::new());
        let summary = small_scanner(sink.clone(), 1024)
            .run([fixture.root()])
            .unwrap()
            .wait()
            .unwrap();

        let record = serde_json::to_value(&sink.records()[0]).unwrap();
        assert_eq!(record["path"], path.to_str().unwrap());
        assert_eq!(record["checksum"], 0x3524_41c2u32);
        assert_eq!(record["size"], 3);

        let summary = serde_json::to_value(&summary).unwrap();
        assert_eq!(summary["files_checksummed"], 1);
        Ok(())
    }
}
