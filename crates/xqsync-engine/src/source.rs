//! Where the identifiers to synchronize come from

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xqsync_io::{is_sidecar, relative_uri, FileFinder};
use xqsync_session::{ListingScope, SessionListing};
use xqsync_types::{Error, IdentifierSource, Result};

/// Every file under a directory, relative to it, sidecars excluded
#[derive(Debug, Clone)]
pub struct FileTreeSource {
    root: PathBuf,
    include: Option<String>,
    exclude: Option<String>,
}

impl FileTreeSource {
    /// Source walking `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            include: None,
            exclude: None,
        }
    }

    /// Keep only relative paths matching `pattern`
    pub fn with_include<S: Into<String>>(mut self, pattern: Option<S>) -> Self {
        self.include = pattern.map(Into::into);
        self
    }

    /// Drop relative paths matching `pattern`
    pub fn with_exclude<S: Into<String>>(mut self, pattern: Option<S>) -> Self {
        self.exclude = pattern.map(Into::into);
        self
    }

    /// Walked directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self) -> Result<Vec<String>> {
        let mut finder = FileFinder::new(&self.root);
        if let Some(pattern) = &self.include {
            finder = finder.with_include(pattern)?;
        }
        if let Some(pattern) = &self.exclude {
            finder = finder.with_exclude(pattern)?;
        }
        finder.find();
        for error in finder.errors() {
            warn!("{}", error);
        }

        let mut identifiers = Vec::with_capacity(finder.size());
        while let Some(path) = finder.remove() {
            if is_sidecar(&path) {
                continue;
            }
            if let Some(uri) = relative_uri(&self.root, &path) {
                identifiers.push(uri);
            }
        }
        Ok(identifiers)
    }
}

#[async_trait]
impl IdentifierSource for FileTreeSource {
    async fn identifiers(&self) -> Result<Vec<String>> {
        let source = self.clone();
        let identifiers = tokio::task::spawn_blocking(move || source.walk())
            .await
            .map_err(|e| Error::other(format!("File walk failed: {}", e)))??;
        debug!("{} files under {}", identifiers.len(), self.root.display());
        Ok(identifiers)
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Identifiers listed by a session
#[derive(Debug, Clone)]
pub struct SessionListingSource {
    listing: SessionListing,
}

impl SessionListingSource {
    /// Source backed by `listing`
    pub fn new(listing: SessionListing) -> Self {
        Self { listing }
    }
}

#[async_trait]
impl IdentifierSource for SessionListingSource {
    async fn identifiers(&self) -> Result<Vec<String>> {
        self.listing.uris().await
    }

    fn describe(&self) -> String {
        match self.listing.scope() {
            ListingScope::Collections(collections) => {
                format!("collections {}", collections.join(" "))
            }
            ListingScope::Directory(directory) => format!("directory uri {}", directory),
            ListingScope::All => "all documents".to_string(),
        }
    }
}

/// A fixed list of identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSource {
    uris: Vec<String>,
}

impl StaticSource {
    /// Source yielding `uris` in order
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uris: uris.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl IdentifierSource for StaticSource {
    async fn identifiers(&self) -> Result<Vec<String>> {
        Ok(self.uris.clone())
    }

    fn describe(&self) -> String {
        format!("{} listed identifiers", self.uris.len())
    }
}
