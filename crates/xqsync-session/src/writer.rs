//! Session-backed document writer

use crate::{QueryRequest, ResultItem, SessionPool};
use async_trait::async_trait;
use tracing::debug;
use xqsync_types::{DocumentContent, DocumentMetadata, DocumentWriter, Error, Result};

/// Inserts each document, content and metadata together, in a single request
#[derive(Debug, Clone)]
pub struct SessionWriter {
    pool: SessionPool,
}

impl SessionWriter {
    /// Writer borrowing sessions from `pool`
    pub fn new(pool: SessionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentWriter for SessionWriter {
    async fn write(
        &self,
        uri: &str,
        content: &DocumentContent,
        metadata: &DocumentMetadata,
    ) -> Result<u64> {
        let bytes = content.to_bytes().await?;
        let len = bytes.len() as u64;

        let mut session = self.pool.acquire().await?;
        session
            .submit(QueryRequest::insert(uri, bytes, metadata.clone()))
            .await?;
        debug!("Inserted {} ({} bytes)", uri, len);
        Ok(len)
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let mut session = self.pool.acquire().await?;
        match session.submit(QueryRequest::exists(uri)).await?.first() {
            Some(ResultItem::Boolean(exists)) => Ok(*exists),
            other => Err(Error::session(format!(
                "Unexpected existence result for '{}': {:?}",
                uri, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionString, MemoryContentbase, PoolConfig};
    use std::sync::Arc;
    use xqsync_types::{Capability, Permission};

    #[tokio::test]
    async fn test_write_then_exists() {
        let store = MemoryContentbase::new();
        let pool = SessionPool::open(
            ConnectionString::parse("xdbc://u:p@memory:8000").unwrap(),
            Arc::new(store.clone()),
            PoolConfig::default(),
        )
        .await
        .unwrap();
        let writer = SessionWriter::new(pool);

        let mut metadata = DocumentMetadata::new();
        metadata.add_collection("c");
        metadata.add_permission(Permission::new("r", Capability::Read));

        assert!(!writer.exists("/doc one.xml").await.unwrap());
        let written = writer
            .write("/doc one.xml", &DocumentContent::from("<doc/>"), &metadata)
            .await
            .unwrap();
        assert_eq!(written, 6);
        assert!(writer.exists("/doc one.xml").await.unwrap());

        let (content, stored) = store.get("/doc one.xml").unwrap();
        assert_eq!(&content[..], b"<doc/>");
        assert_eq!(stored, metadata);
    }
}
