//! Document and metadata model
//!
//! A [`Document`] starts out as a bare identifier, is populated by a reader and
//! consumed by a writer. Content is either held in memory or, for large payloads,
//! left in a file and streamed when written.

use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Payloads larger than this are kept file-backed by filesystem readers
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Operation a role is granted on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Read the document
    Read,
    /// Replace the document
    Update,
    /// Execute the document as a module
    Execute,
    /// Insert children
    Insert,
    /// Update individual nodes
    NodeUpdate,
}

impl Capability {
    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Update => "update",
            Self::Execute => "execute",
            Self::Insert => "insert",
            Self::NodeUpdate => "node-update",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "execute" => Ok(Self::Execute),
            "insert" => Ok(Self::Insert),
            "node-update" => Ok(Self::NodeUpdate),
            other => Err(Error::metadata(format!("unknown capability '{}'", other))),
        }
    }
}

/// A role paired with a capability
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Role name
    pub role: String,
    /// Granted capability
    pub capability: Capability,
}

impl Permission {
    /// Create a new permission
    pub fn new(role: impl Into<String>, capability: Capability) -> Self {
        Self {
            role: role.into(),
            capability,
        }
    }
}

/// Storage format of a document
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Opaque bytes
    Binary,
    /// Plain text
    Text,
    /// XML
    #[default]
    Xml,
    /// JSON
    Json,
}

impl DocumentFormat {
    /// Infer the format from a file extension, case-insensitively
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "xml" | "xsl" | "xslt" | "xsd" | "svg" => Self::Xml,
            "json" => Self::Json,
            "txt" | "html" | "htm" | "css" | "js" | "csv" | "md" => Self::Text,
            _ => Self::Binary,
        }
    }

    /// Infer the format from a path; no extension means binary
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::Binary, Self::from_extension)
    }
}

/// Collections, permissions, properties, quality and format of a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    /// Collection names
    pub collections: BTreeSet<String>,
    permissions: Vec<Permission>,
    /// Named string properties
    pub properties: BTreeMap<String, String>,
    /// Search quality
    pub quality: i32,
    /// Storage format
    pub format: DocumentFormat,
}

impl DocumentMetadata {
    /// Create empty metadata with the default format
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the format
    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a collection; returns false when already present
    pub fn add_collection(&mut self, name: impl Into<String>) -> bool {
        self.collections.insert(name.into())
    }

    /// Append a permission unless an identical one exists
    pub fn add_permission(&mut self, permission: Permission) -> bool {
        if self.permissions.contains(&permission) {
            return false;
        }
        self.permissions.push(permission);
        true
    }

    /// Permissions in insertion order
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Drop all permissions
    pub fn clear_permissions(&mut self) {
        self.permissions.clear();
    }

    /// Set a property, returning the previous value
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.properties.insert(name.into(), value.into())
    }

    fn permission_set(&self) -> BTreeSet<&Permission> {
        self.permissions.iter().collect()
    }
}

impl PartialEq for DocumentMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.collections == other.collections
            && self.properties == other.properties
            && self.quality == other.quality
            && self.format == other.format
            && self.permission_set() == other.permission_set()
    }
}

impl Eq for DocumentMetadata {}

/// Document payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    /// Content held in memory
    Bytes(Bytes),
    /// Content left on disk and streamed on write
    File {
        /// Location of the payload
        path: PathBuf,
        /// Payload length in bytes
        len: u64,
    },
}

impl DocumentContent {
    /// Empty in-memory content
    pub fn empty() -> Self {
        Self::Bytes(Bytes::new())
    }

    /// Length in bytes
    pub fn len(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    /// Whether the payload has zero length
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the payload lives on disk
    pub fn is_file_backed(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// Load the full payload into memory
    pub async fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::File { path, len } => {
                let mut file = tokio::fs::File::open(path).await.map_err(|e| {
                    Error::io(format!("Failed to open {}: {}", path.display(), e))
                })?;
                let mut buffer = Vec::with_capacity(*len as usize);
                file.read_to_end(&mut buffer).await.map_err(|e| {
                    Error::io(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Ok(Bytes::from(buffer))
            }
        }
    }

    /// Copy the payload into `writer`, streaming file-backed content
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let written = match self {
            Self::Bytes(bytes) => {
                writer.write_all(bytes).await?;
                bytes.len() as u64
            }
            Self::File { path, .. } => {
                let mut file = tokio::fs::File::open(path).await.map_err(|e| {
                    Error::io(format!("Failed to open {}: {}", path.display(), e))
                })?;
                tokio::io::copy(&mut file, writer).await?
            }
        };
        writer.flush().await?;
        Ok(written)
    }
}

impl Default for DocumentContent {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for DocumentContent {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for DocumentContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static str> for DocumentContent {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// Outcome of reading a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReadStatus {
    /// Constructed, not read yet
    #[default]
    Pending,
    /// Content and metadata populated
    Loaded,
    /// The source has no such document
    NotFound,
    /// Reading failed
    Failed(Error),
}

/// A document in flight between a reader and a writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Source identifier
    pub uri: String,
    /// Payload
    pub content: DocumentContent,
    /// Metadata
    pub metadata: DocumentMetadata,
    /// Read outcome
    pub status: ReadStatus,
}

impl Document {
    /// An unread document for `uri`
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            content: DocumentContent::empty(),
            metadata: DocumentMetadata::default(),
            status: ReadStatus::Pending,
        }
    }

    /// Populate content and metadata
    pub fn load(&mut self, content: DocumentContent, metadata: DocumentMetadata) {
        self.content = content;
        self.metadata = metadata;
        self.status = ReadStatus::Loaded;
    }

    /// Record that the source does not hold this document
    pub fn mark_not_found(&mut self) {
        self.status = ReadStatus::NotFound;
    }

    /// Record a read failure
    pub fn mark_failed(&mut self, error: Error) {
        self.status = ReadStatus::Failed(error);
    }

    /// Whether content and metadata are populated
    pub fn is_loaded(&self) -> bool {
        self.status == ReadStatus::Loaded
    }

    /// The read failure as an error, if the document is not loaded
    pub fn read_error(&self) -> Option<Error> {
        match &self.status {
            ReadStatus::Loaded => None,
            ReadStatus::Pending => Some(Error::other(format!(
                "Document '{}' was never read",
                self.uri
            ))),
            ReadStatus::NotFound => Some(Error::not_found(self.uri.clone())),
            ReadStatus::Failed(error) => Some(error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("a.xml", DocumentFormat::Xml)]
    #[case("style.XSL", DocumentFormat::Xml)]
    #[case("data.json", DocumentFormat::Json)]
    #[case("notes.txt", DocumentFormat::Text)]
    #[case("page.html", DocumentFormat::Text)]
    #[case("image.png", DocumentFormat::Binary)]
    #[case("README", DocumentFormat::Binary)]
    fn test_format_from_path(#[case] path: &str, #[case] expected: DocumentFormat) {
        assert_eq!(DocumentFormat::from_path(Path::new(path)), expected);
    }

    #[test]
    fn test_duplicate_permission_ignored() {
        let mut metadata = DocumentMetadata::new();
        assert!(metadata.add_permission(Permission::new("reader", Capability::Read)));
        assert!(!metadata.add_permission(Permission::new("reader", Capability::Read)));
        assert!(metadata.add_permission(Permission::new("reader", Capability::Update)));
        assert_eq!(metadata.permissions().len(), 2);
    }

    #[test]
    fn test_permission_order_ignored_by_equality() {
        let mut left = DocumentMetadata::new();
        left.add_permission(Permission::new("a", Capability::Read));
        left.add_permission(Permission::new("b", Capability::Insert));

        let mut right = DocumentMetadata::new();
        right.add_permission(Permission::new("b", Capability::Insert));
        right.add_permission(Permission::new("a", Capability::Read));

        assert_eq!(left, right);

        right.quality = 3;
        assert_ne!(left, right);
    }

    #[test]
    fn test_metadata_serde_field_names() {
        let mut metadata = DocumentMetadata::new().with_format(DocumentFormat::Json);
        metadata.add_collection("docs");
        metadata.add_permission(Permission::new("editor", Capability::NodeUpdate));
        metadata.set_property("owner", "alice");

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["permissions"][0]["capability"], "node-update");
        assert_eq!(json["properties"]["owner"], "alice");

        let back: DocumentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_metadata_missing_fields_default() {
        let metadata: DocumentMetadata = serde_json::from_str(r#"{"quality": 2}"#).unwrap();
        assert_eq!(metadata.quality, 2);
        assert_eq!(metadata.format, DocumentFormat::Xml);
        assert!(metadata.collections.is_empty());
    }

    #[test]
    fn test_capability_parse() {
        assert_eq!("Node-Update".parse::<Capability>().unwrap(), Capability::NodeUpdate);
        assert!("delete".parse::<Capability>().is_err());
    }

    #[tokio::test]
    async fn test_file_backed_content_streams() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"streamed payload").unwrap();

        let content = DocumentContent::File {
            path: path.clone(),
            len: 16,
        };
        assert!(content.is_file_backed());
        assert_eq!(content.to_bytes().await.unwrap(), Bytes::from_static(b"streamed payload"));

        let mut sink = Vec::new();
        let written = content.write_to(&mut sink).await.unwrap();
        assert_eq!(written, 16);
        assert_eq!(sink, b"streamed payload");
    }

    #[test]
    fn test_document_status() {
        let mut document = Document::new("/a b.xml");
        assert_eq!(document.status, ReadStatus::Pending);
        assert!(document.read_error().is_some());

        document.mark_not_found();
        assert_eq!(document.read_error(), Some(Error::not_found("/a b.xml")));

        document.load("<a/>".into(), DocumentMetadata::new());
        assert!(document.is_loaded());
        assert_eq!(document.content.len(), 4);
    }
}
