//! Core traits for XQSync operations
//!
//! Readers, writers and identifier sources are the seams between the sync
//! engine and the stores it moves documents between.

use crate::{Document, DocumentContent, DocumentMetadata, Result};
use async_trait::async_trait;

/// Populates documents from a source store
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Read every `Some` entry of `batch` in place.
    ///
    /// Per-document outcomes are recorded in [`Document::status`]; an `Err`
    /// means the whole batch failed.
    async fn read(&self, batch: &mut [Option<Document>]) -> Result<()>;
}

/// Persists documents into a destination store
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    /// Write one document under `uri`, returning the number of content bytes written
    async fn write(
        &self,
        uri: &str,
        content: &DocumentContent,
        metadata: &DocumentMetadata,
    ) -> Result<u64>;

    /// Whether the destination already holds `uri`
    async fn exists(&self, uri: &str) -> Result<bool>;
}

/// Enumerates the identifiers to synchronize
#[async_trait]
pub trait IdentifierSource: Send + Sync {
    /// All identifiers, in source order
    async fn identifiers(&self) -> Result<Vec<String>>;

    /// Short description for log lines
    fn describe(&self) -> String;
}
