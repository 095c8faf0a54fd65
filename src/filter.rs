//! File selection filters
//!
//! The walker asks a [`FileFilter`] about every regular file it finds; only
//! files it accepts become reader work. Filters look at the file name, never at
//! content, and must be cheap because they run on the single walker thread.
//!
//! Any `Fn(&Path) -> bool + Send + Sync` closure is a filter too.

use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Predicate deciding which files are checksummed
pub trait FileFilter: Send + Sync {
    /// Whether the file at `path` should be processed
    fn matches(&self, path: &Path) -> bool;
}

impl<F> FileFilter for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn matches(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Accepts every file
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl FileFilter for MatchAll {
    fn matches(&self, _path: &Path) -> bool {
        true
    }
}

/// Accepts files whose extension is one of a set, ignoring ASCII case
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// Build a filter from extensions, with or without a leading dot
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { extensions }
    }
}

impl FileFilter for ExtensionFilter {
    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

/// Accepts files whose name matches any of a set of glob patterns
///
/// Patterns are matched against the file name only, so `*.txt` selects text
/// files at every depth.
#[derive(Clone)]
pub struct GlobFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl GlobFilter {
    /// Compile glob patterns
    ///
    /// # Errors
    ///
    /// - [`crate::ScanError::InvalidPattern`] if a pattern does not parse
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder.add(Glob::new(pattern)?);
            kept.push(pattern.to_string());
        }
        let set = builder.build()?;
        debug!("Compiled {} file patterns", kept.len());

        Ok(Self {
            patterns: kept,
            set,
        })
    }

    /// Source patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl fmt::Debug for GlobFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobFilter")
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl FileFilter for GlobFilter {
    fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.set.is_match(name))
            .unwrap_or(false)
    }
}
