//! Filesystem document reader

use crate::metadata::read_sidecar;
use crate::path::resolve_uri;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;
use xqsync_types::{
    Document, DocumentContent, DocumentFormat, DocumentMetadata, DocumentReader, Error, Result,
    DEFAULT_STREAMING_THRESHOLD,
};

/// Reads documents, and their sidecars, from under an input root
#[derive(Debug, Clone)]
pub struct FilePathReader {
    root: PathBuf,
    streaming_threshold: u64,
}

impl FilePathReader {
    /// Reader rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
        }
    }

    /// Files larger than `threshold` bytes are left on disk and streamed on write
    pub fn with_streaming_threshold(mut self, threshold: u64) -> Self {
        self.streaming_threshold = threshold;
        self
    }

    /// Input root
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_one(&self, document: &mut Document) {
        let path = match resolve_uri(&self.root, &document.uri) {
            Ok(path) => path,
            Err(e) => return document.mark_failed(e),
        };

        let stat = match tokio::fs::metadata(&path).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found", path.display());
                return document.mark_not_found();
            }
            Err(e) => {
                return document.mark_failed(Error::io(format!(
                    "Failed to stat '{}': {}",
                    path.display(),
                    e
                )))
            }
        };
        if !stat.is_file() {
            return document.mark_failed(Error::malformed(&document.uri, "not a regular file"));
        }

        let content = if stat.len() > self.streaming_threshold {
            DocumentContent::File {
                path: path.clone(),
                len: stat.len(),
            }
        } else {
            match tokio::fs::read(&path).await {
                Ok(bytes) => DocumentContent::Bytes(Bytes::from(bytes)),
                Err(e) => {
                    return document.mark_failed(Error::io(format!(
                        "Failed to read '{}': {}",
                        path.display(),
                        e
                    )))
                }
            }
        };

        let metadata = match read_sidecar(&path).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => DocumentMetadata::new().with_format(DocumentFormat::from_path(&path)),
            Err(e) => return document.mark_failed(e),
        };

        debug!("Read {} ({} bytes)", path.display(), content.len());
        document.load(content, metadata);
    }
}

#[async_trait]
impl DocumentReader for FilePathReader {
    async fn read(&self, batch: &mut [Option<Document>]) -> Result<()> {
        for document in batch.iter_mut().flatten() {
            self.read_one(document).await;
        }
        Ok(())
    }
}
