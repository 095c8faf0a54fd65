//! Directory walker
//!
//! A single thread expands directories from an explicit backlog instead of
//! recursing, so tree depth never touches the call stack. Each expansion lists
//! one directory: subdirectories go back on the backlog, matching regular
//! files go to the reader queue. The walker stops when the backlog is empty
//! or the scan is cancelled, and dropping its sender closes the reader queue.

use crate::error::ScanError;
use crate::filter::FileFilter;
use crate::scanner::{CancelToken, ScanStats};
use crate::sink::ResultSink;
use crate::types::{DirectoryTask, FailureStage, FileFailure, FileTask};
use crossbeam_channel::Sender;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Sequential directory expander feeding the reader stage
pub(crate) struct Walker {
    pub(crate) filter: Arc<dyn FileFilter>,
    pub(crate) sink: Arc<dyn ResultSink>,
    pub(crate) stats: Arc<ScanStats>,
    pub(crate) cancel: CancelToken,
    pub(crate) follow_symlinks: bool,
}

impl Walker {
    /// Walk every root, sending matching files to `files`
    ///
    /// Roots that are regular files are sent as-is without consulting the
    /// filter. Duplicate roots are walked once per occurrence.
    pub(crate) fn run(self, roots: Vec<PathBuf>, files: Sender<FileTask>) {
        let mut backlog = VecDeque::new();
        // (root index, canonical path) of directories already queued
        let mut visited = HashSet::new();

        for (index, root) in roots.into_iter().enumerate() {
            match fs::metadata(&root) {
                Ok(metadata) if metadata.is_file() => {
                    if self.send(&files, root).is_break() {
                        return;
                    }
                }
                _ => {
                    if self.follow_symlinks {
                        if let Ok(canonical) = fs::canonicalize(&root) {
                            visited.insert((index, canonical));
                        }
                    }
                    backlog.push_back(DirectoryTask::new(root, index));
                }
            }
        }

        while let Some(task) = backlog.pop_front() {
            if self.cancel.is_cancelled() {
                debug!("Walk cancelled with {} directories pending", backlog.len() + 1);
                return;
            }
            if self.expand(&task, &mut backlog, &mut visited, &files).is_break() {
                return;
            }
        }

        debug!(
            "Walk complete: {} directories, {} files",
            self.stats.snapshot_directories(),
            self.stats.snapshot_discovered()
        );
    }

    fn expand(
        &self,
        task: &DirectoryTask,
        backlog: &mut VecDeque<DirectoryTask>,
        visited: &mut HashSet<(usize, PathBuf)>,
        files: &Sender<FileTask>,
    ) -> ControlFlow<()> {
        trace!("Expanding {:?}", task.path());
        self.stats.record_directory();

        let entries = WalkDir::new(task.path())
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_symlinks);

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.to_path_buf())
                        .unwrap_or_else(|| task.path().to_path_buf());
                    warn!("Walk error under {:?}: {}", task.path(), e);
                    self.stats.record_failure();
                    self.sink
                        .failure(FileFailure::new(path, FailureStage::Walk, ScanError::from(e)));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if self.follow_symlinks {
                    let canonical = match fs::canonicalize(entry.path()) {
                        Ok(canonical) => canonical,
                        Err(e) => {
                            warn!("Cannot resolve {:?}: {}", entry.path(), e);
                            self.stats.record_failure();
                            self.sink.failure(FileFailure::new(
                                entry.path().to_path_buf(),
                                FailureStage::Walk,
                                ScanError::from(e),
                            ));
                            continue;
                        }
                    };
                    if !visited.insert((task.root(), canonical)) {
                        trace!("Skipping already visited {:?}", entry.path());
                        continue;
                    }
                }
                backlog.push_back(DirectoryTask::new(entry.into_path(), task.root()));
            } else if file_type.is_file() {
                if self.filter.matches(entry.path()) {
                    self.send(files, entry.into_path())?;
                }
            } else {
                trace!("Skipping non-regular entry {:?}", entry.path());
            }
        }

        ControlFlow::Continue(())
    }

    fn send(&self, files: &Sender<FileTask>, path: PathBuf) -> ControlFlow<()> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        // Blocks while the reader queue is full
        if files.send(FileTask::new(path)).is_err() {
            warn!("Reader stage closed early, stopping walk");
            return ControlFlow::Break(());
        }
        self.stats.record_discovered();
        ControlFlow::Continue(())
    }
}
