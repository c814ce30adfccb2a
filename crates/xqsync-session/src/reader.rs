//! Session-backed document reader

use crate::session::{BINDING_INCLUDE_PERMISSIONS, BINDING_INCLUDE_PROPERTIES};
use crate::{QueryRequest, ResultItem, SessionPool};
use async_trait::async_trait;
use tracing::{debug, warn};
use xqsync_types::{Document, DocumentContent, DocumentReader, Result};

/// Reads a batch of documents in one round trip through a pooled session
#[derive(Debug, Clone)]
pub struct SessionReader {
    pool: SessionPool,
    copy_permissions: bool,
    copy_properties: bool,
}

impl SessionReader {
    /// Reader borrowing sessions from `pool`
    pub fn new(pool: SessionPool) -> Self {
        Self {
            pool,
            copy_permissions: true,
            copy_properties: true,
        }
    }

    /// Whether fetched metadata includes permissions
    pub fn with_permissions(mut self, copy: bool) -> Self {
        self.copy_permissions = copy;
        self
    }

    /// Whether fetched metadata includes properties
    pub fn with_properties(mut self, copy: bool) -> Self {
        self.copy_properties = copy;
        self
    }
}

#[async_trait]
impl DocumentReader for SessionReader {
    async fn read(&self, batch: &mut [Option<Document>]) -> Result<()> {
        let uris: Vec<String> = batch.iter().flatten().map(|doc| doc.uri.clone()).collect();
        if uris.is_empty() {
            return Ok(());
        }

        let mut request = QueryRequest::fetch(uris);
        if !self.copy_permissions {
            request = request.bind(BINDING_INCLUDE_PERMISSIONS, "false");
        }
        if !self.copy_properties {
            request = request.bind(BINDING_INCLUDE_PROPERTIES, "false");
        }

        let mut session = self.pool.acquire().await?;
        let items = session.submit(request).await?;
        drop(session);

        demultiplex(batch, items);
        Ok(())
    }
}

/// Assign result items to the batch in request order.
///
/// Items arrive in request order with gaps for missing uris, so each document
/// takes the next item only when its uri matches.
fn demultiplex(batch: &mut [Option<Document>], items: Vec<ResultItem>) {
    let mut items = items
        .into_iter()
        .filter_map(|item| match item {
            ResultItem::Document {
                uri,
                content,
                metadata,
            } => Some((uri, content, metadata)),
            other => {
                warn!("Ignoring unexpected fetch result {:?}", other);
                None
            }
        })
        .peekable();

    for document in batch.iter_mut().flatten() {
        match items.next_if(|(uri, _, _)| *uri == document.uri) {
            Some((_, content, metadata)) => {
                debug!("Read {} ({} bytes)", document.uri, content.len());
                document.load(DocumentContent::Bytes(content), metadata);
            }
            None => {
                debug!("No result for {}", document.uri);
                document.mark_not_found();
            }
        }
    }

    let leftover = items.count();
    if leftover > 0 {
        warn!("{} fetch results did not match any requested uri", leftover);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionString, MemoryContentbase, PoolConfig};
    use bytes::Bytes;
    use std::sync::Arc;
    use xqsync_types::{Capability, DocumentMetadata, Permission, ReadStatus};

    async fn pool_for(store: &MemoryContentbase) -> SessionPool {
        SessionPool::open(
            ConnectionString::parse("xcc://u:p@memory:8000").unwrap(),
            Arc::new(store.clone()),
            PoolConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_gap_is_not_found() {
        let store = MemoryContentbase::new();
        store.insert("/1.xml", Bytes::from_static(b"<one/>"), DocumentMetadata::new());
        store.insert("/3.xml", Bytes::from_static(b"<three/>"), DocumentMetadata::new());

        let reader = SessionReader::new(pool_for(&store).await);
        let mut batch = vec![
            Some(Document::new("/1.xml")),
            None,
            Some(Document::new("/2.xml")),
            Some(Document::new("/3.xml")),
        ];
        reader.read(&mut batch).await.unwrap();

        assert!(batch[0].as_ref().unwrap().is_loaded());
        assert!(batch[1].is_none());
        assert_eq!(batch[2].as_ref().unwrap().status, ReadStatus::NotFound);
        let third = batch[3].as_ref().unwrap();
        assert!(third.is_loaded());
        assert_eq!(third.content, DocumentContent::from("<three/>"));
    }

    #[tokio::test]
    async fn test_drop_permissions_on_read() {
        let store = MemoryContentbase::new();
        let mut metadata = DocumentMetadata::new();
        metadata.add_permission(Permission::new("reader", Capability::Read));
        metadata.set_property("k", "v");
        store.insert("/p.xml", Bytes::from_static(b"<p/>"), metadata);

        let reader = SessionReader::new(pool_for(&store).await).with_permissions(false);
        let mut batch = vec![Some(Document::new("/p.xml"))];
        reader.read(&mut batch).await.unwrap();

        let document = batch[0].as_ref().unwrap();
        assert!(document.metadata.permissions().is_empty());
        assert_eq!(document.metadata.properties.get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_batch_failure_is_error() {
        let store = MemoryContentbase::new();
        let pool = pool_for(&store).await;
        store.fail_next(crate::QueryOperation::FetchDocuments, 1);

        let reader = SessionReader::new(pool);
        let mut batch = vec![Some(Document::new("/x.xml"))];
        let error = reader.read(&mut batch).await.unwrap_err();
        assert!(error.should_retry());
    }

    #[test]
    fn test_demultiplex_all_missing() {
        let mut batch = vec![Some(Document::new("/a")), Some(Document::new("/b"))];
        demultiplex(&mut batch, Vec::new());
        assert!(batch
            .iter()
            .flatten()
            .all(|doc| doc.status == ReadStatus::NotFound));
    }
}
