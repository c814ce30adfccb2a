//! Recursive file discovery with include and exclude patterns

use crate::path::relative_uri;
use regex_lite::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use xqsync_types::{Error, Result};

/// Collects files under a base directory into a FIFO queue
#[derive(Debug)]
pub struct FileFinder {
    base: PathBuf,
    include: Option<Regex>,
    exclude: Option<Regex>,
    queue: VecDeque<PathBuf>,
    errors: Vec<Error>,
}

impl FileFinder {
    /// Finder rooted at `base`
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base: base.into(),
            include: None,
            exclude: None,
            queue: VecDeque::new(),
            errors: Vec::new(),
        }
    }

    /// Keep only files whose relative path matches `pattern`
    pub fn with_include(mut self, pattern: &str) -> Result<Self> {
        self.include = Some(compile("include", pattern)?);
        Ok(self)
    }

    /// Drop files whose relative path matches `pattern`
    pub fn with_exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude = Some(compile("exclude", pattern)?);
        Ok(self)
    }

    /// Base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Walk the base directory, queueing every retained file.
    ///
    /// Returns the number of files found by this walk. A missing base yields
    /// nothing; unreadable directories are recorded in [`FileFinder::errors`]
    /// and skipped.
    pub fn find(&mut self) -> usize {
        if !self.base.exists() {
            debug!("{} does not exist, nothing to find", self.base.display());
            return 0;
        }

        let before = self.queue.len();
        let walker = WalkDir::new(&self.base)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let location = e
                        .path()
                        .map_or_else(|| self.base.clone(), Path::to_path_buf);
                    warn!("Skipping {}: {}", location.display(), e);
                    self.errors.push(Error::io(format!(
                        "Failed to read {}: {}",
                        location.display(),
                        e
                    )));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if self.accepts(entry.path()) {
                self.queue.push_back(entry.into_path());
            }
        }

        let found = self.queue.len() - before;
        debug!("Found {} files under {}", found, self.base.display());
        found
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(relative) = relative_uri(&self.base, path) else {
            return false;
        };
        let included = self
            .include
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(&relative));
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&relative));
        included && !excluded
    }

    /// Number of queued files
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Take the oldest queued file
    pub fn remove(&mut self) -> Option<PathBuf> {
        self.queue.pop_front()
    }

    /// Queue a file directly, bypassing the patterns
    pub fn add<P: Into<PathBuf>>(&mut self, path: P) {
        self.queue.push_back(path.into());
    }

    /// Queued files relative to `root`, in queue order, joined with `/`
    pub fn list_relative_paths(&self, root: &Path) -> Vec<String> {
        self.queue
            .iter()
            .map(|path| {
                relative_uri(root, path).unwrap_or_else(|| path.to_string_lossy().into_owned())
            })
            .collect()
    }

    /// Errors met while walking
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }
}

fn compile(kind: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::config(format!("Invalid {} pattern '{}': {}", kind, pattern, e)))
}
