//! Session collaborator interface
//!
//! The network protocol and the query language live behind [`Session`]. The
//! sync core only builds [`QueryRequest`] values and interprets the
//! [`ResultItem`] sequence that comes back.

use crate::ConnectionString;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use xqsync_types::{DocumentMetadata, Result};

/// What a request asks the endpoint to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOperation {
    /// Return content and metadata for each requested uri, in request order
    FetchDocuments,
    /// Store the payload under the single requested uri
    InsertDocument,
    /// List uris in the collections or directory named by the bindings
    ListUris,
    /// Answer whether the single requested uri exists
    DocumentExists,
}

/// Binding naming whitespace-separated collections for [`QueryOperation::ListUris`]
pub const BINDING_COLLECTIONS: &str = "collections";
/// Binding naming a directory uri for [`QueryOperation::ListUris`]
pub const BINDING_DIRECTORY: &str = "directory";
/// Binding set to `"false"` to leave permissions out of fetched metadata
pub const BINDING_INCLUDE_PERMISSIONS: &str = "include-permissions";
/// Binding set to `"false"` to leave properties out of fetched metadata
pub const BINDING_INCLUDE_PROPERTIES: &str = "include-properties";

/// A request submitted through a session
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Requested operation
    pub operation: QueryOperation,
    /// Target identifiers
    pub uris: Vec<String>,
    /// Named external variables
    pub bindings: BTreeMap<String, String>,
    /// Content and metadata for inserts
    pub payload: Option<(Bytes, DocumentMetadata)>,
}

impl QueryRequest {
    /// Fetch several documents in one round trip
    pub fn fetch(uris: Vec<String>) -> Self {
        Self::new(QueryOperation::FetchDocuments, uris)
    }

    /// Insert one document with its metadata
    pub fn insert(uri: impl Into<String>, content: Bytes, metadata: DocumentMetadata) -> Self {
        let mut request = Self::new(QueryOperation::InsertDocument, vec![uri.into()]);
        request.payload = Some((content, metadata));
        request
    }

    /// Check whether one document exists
    pub fn exists(uri: impl Into<String>) -> Self {
        Self::new(QueryOperation::DocumentExists, vec![uri.into()])
    }

    /// List uris; narrowed with [`QueryRequest::bind`]
    pub fn list() -> Self {
        Self::new(QueryOperation::ListUris, Vec::new())
    }

    fn new(operation: QueryOperation, uris: Vec<String>) -> Self {
        Self {
            operation,
            uris,
            bindings: BTreeMap::new(),
            payload: None,
        }
    }

    /// Add an external variable binding
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    /// Binding value by name
    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }
}

/// One item of a result sequence
#[derive(Debug, Clone, PartialEq)]
pub enum ResultItem {
    /// A fetched document
    Document {
        /// Identifier the endpoint returned it under
        uri: String,
        /// Payload
        content: Bytes,
        /// Metadata
        metadata: DocumentMetadata,
    },
    /// A listed identifier
    Uri(String),
    /// A predicate answer
    Boolean(bool),
}

/// An open session to a document-database endpoint
#[async_trait]
pub trait Session: Send {
    /// Submit a request and collect its result sequence
    async fn submit(&mut self, request: QueryRequest) -> Result<Vec<ResultItem>>;

    /// Whether the session can still be used
    fn is_alive(&self) -> bool {
        true
    }

    /// Release the session
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens sessions to endpoints
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Establish a new session
    async fn connect(&self, connection: &ConnectionString) -> Result<Box<dyn Session>>;
}
