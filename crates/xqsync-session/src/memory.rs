//! In-process contentbase
//!
//! [`MemoryContentbase`] answers the session protocol from a map held in
//! memory. It stages documents locally and stands in for a real endpoint in
//! tests, with knobs for refusing connections, failing requests and slowing
//! writes down.

use crate::session::{
    BINDING_COLLECTIONS, BINDING_DIRECTORY, BINDING_INCLUDE_PERMISSIONS,
    BINDING_INCLUDE_PROPERTIES,
};
use crate::{ConnectionString, QueryOperation, QueryRequest, ResultItem, Session, SessionConnector};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use xqsync_types::{DocumentMetadata, Error, Result};

#[derive(Default)]
struct StoreState {
    documents: Mutex<BTreeMap<String, (Bytes, DocumentMetadata)>>,
    refuse: AtomicBool,
    connections: AtomicUsize,
    inserts: AtomicUsize,
    failures: Mutex<HashMap<QueryOperation, usize>>,
    write_delay: Mutex<Duration>,
    active_writes: Mutex<HashMap<String, usize>>,
    max_concurrent_writes: AtomicUsize,
}

/// Documents keyed by uri, reachable through the session protocol
#[derive(Clone, Default)]
pub struct MemoryContentbase {
    state: Arc<StoreState>,
}

impl MemoryContentbase {
    /// Empty contentbase
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document directly, bypassing sessions
    pub fn insert(
        &self,
        uri: impl Into<String>,
        content: impl Into<Bytes>,
        metadata: DocumentMetadata,
    ) {
        self.state
            .documents
            .lock()
            .insert(uri.into(), (content.into(), metadata));
    }

    /// Content and metadata stored under `uri`
    pub fn get(&self, uri: &str) -> Option<(Bytes, DocumentMetadata)> {
        self.state.documents.lock().get(uri).cloned()
    }

    /// Whether `uri` is stored
    pub fn contains(&self, uri: &str) -> bool {
        self.state.documents.lock().contains_key(uri)
    }

    /// Stored uris in sorted order
    pub fn uris(&self) -> Vec<String> {
        self.state.documents.lock().keys().cloned().collect()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.state.documents.lock().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every following `connect` fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Fail the next `count` requests of `operation` with a session error
    pub fn fail_next(&self, operation: QueryOperation, count: usize) {
        *self.state.failures.lock().entry(operation).or_insert(0) += count;
    }

    /// Hold each insert open for `delay` before committing it
    pub fn set_write_delay(&self, delay: Duration) {
        *self.state.write_delay.lock() = delay;
    }

    /// Sessions established so far
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Inserts committed so far
    pub fn insert_count(&self) -> usize {
        self.state.inserts.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous inserts observed for any single uri
    pub fn max_concurrent_writes(&self) -> usize {
        self.state.max_concurrent_writes.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryContentbase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContentbase")
            .field("documents", &self.len())
            .field("connections", &self.connection_count())
            .finish()
    }
}

#[async_trait]
impl SessionConnector for MemoryContentbase {
    async fn connect(&self, connection: &ConnectionString) -> Result<Box<dyn Session>> {
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(Error::session(format!(
                "{} refused the connection",
                connection.endpoint()
            )));
        }
        self.state.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct MemorySession {
    state: Arc<StoreState>,
    open: bool,
}

impl MemorySession {
    fn take_failure(&self, operation: QueryOperation) -> bool {
        let mut failures = self.state.failures.lock();
        match failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn fetch(&self, request: &QueryRequest) -> Vec<ResultItem> {
        let keep_permissions = request.binding(BINDING_INCLUDE_PERMISSIONS) != Some("false");
        let keep_properties = request.binding(BINDING_INCLUDE_PROPERTIES) != Some("false");
        let documents = self.state.documents.lock();

        request
            .uris
            .iter()
            .filter_map(|uri| {
                let (content, metadata) = documents.get(uri)?;
                let mut metadata = metadata.clone();
                if !keep_permissions {
                    metadata.clear_permissions();
                }
                if !keep_properties {
                    metadata.properties.clear();
                }
                Some(ResultItem::Document {
                    uri: uri.clone(),
                    content: content.clone(),
                    metadata,
                })
            })
            .collect()
    }

    fn list(&self, request: &QueryRequest) -> Vec<ResultItem> {
        let collections: Option<Vec<&str>> = request
            .binding(BINDING_COLLECTIONS)
            .map(|names| names.split_whitespace().collect());
        let directory = request.binding(BINDING_DIRECTORY).map(|dir| {
            if dir.ends_with('/') {
                dir.to_string()
            } else {
                format!("{}/", dir)
            }
        });

        self.state
            .documents
            .lock()
            .iter()
            .filter(|(uri, (_, metadata))| {
                let in_collections = collections.as_ref().map_or(true, |names| {
                    names.iter().any(|name| metadata.collections.contains(*name))
                });
                let in_directory = directory
                    .as_ref()
                    .map_or(true, |dir| uri.starts_with(dir.as_str()));
                in_collections && in_directory
            })
            .map(|(uri, _)| ResultItem::Uri(uri.clone()))
            .collect()
    }

    async fn insert(&self, request: QueryRequest) -> Result<Vec<ResultItem>> {
        let uri = single_uri(&request)?;
        let (content, metadata) = request
            .payload
            .ok_or_else(|| Error::session(format!("insert of '{}' carries no payload", uri)))?;

        let concurrent = {
            let mut active = self.state.active_writes.lock();
            let count = active.entry(uri.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.state
            .max_concurrent_writes
            .fetch_max(concurrent, Ordering::SeqCst);

        let delay = *self.state.write_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.state.documents.lock().insert(uri.clone(), (content, metadata));
        self.state.inserts.fetch_add(1, Ordering::SeqCst);
        {
            let mut active = self.state.active_writes.lock();
            if let Some(count) = active.get_mut(&uri) {
                *count -= 1;
                if *count == 0 {
                    active.remove(&uri);
                }
            }
        }
        debug!("Stored {} in memory contentbase", uri);
        Ok(Vec::new())
    }
}

fn single_uri(request: &QueryRequest) -> Result<String> {
    match request.uris.as_slice() {
        [uri] => Ok(uri.clone()),
        uris => Err(Error::session(format!(
            "{:?} expects exactly one uri, got {}",
            request.operation,
            uris.len()
        ))),
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn submit(&mut self, request: QueryRequest) -> Result<Vec<ResultItem>> {
        if !self.open {
            return Err(Error::session("session is closed"));
        }
        if self.take_failure(request.operation) {
            return Err(Error::session(format!(
                "injected failure for {:?}",
                request.operation
            )));
        }

        match request.operation {
            QueryOperation::FetchDocuments => Ok(self.fetch(&request)),
            QueryOperation::ListUris => Ok(self.list(&request)),
            QueryOperation::DocumentExists => {
                let uri = single_uri(&request)?;
                let exists = self.state.documents.lock().contains_key(&uri);
                Ok(vec![ResultItem::Boolean(exists)])
            }
            QueryOperation::InsertDocument => self.insert(request).await,
        }
    }

    fn is_alive(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}
