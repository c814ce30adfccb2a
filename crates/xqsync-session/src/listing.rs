//! Enumerating document uris held by an endpoint

use crate::session::{BINDING_COLLECTIONS, BINDING_DIRECTORY};
use crate::{QueryRequest, ResultItem, SessionPool};
use tracing::{debug, warn};
use xqsync_types::Result;

/// Which uris a listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingScope {
    /// Documents in any of these collections
    Collections(Vec<String>),
    /// Documents under this directory uri
    Directory(String),
    /// Every document
    All,
}

/// Lists uris through a pooled session
#[derive(Debug, Clone)]
pub struct SessionListing {
    pool: SessionPool,
    scope: ListingScope,
}

impl SessionListing {
    /// Listing over `scope`
    pub fn new(pool: SessionPool, scope: ListingScope) -> Self {
        Self { pool, scope }
    }

    /// The listing scope
    pub fn scope(&self) -> &ListingScope {
        &self.scope
    }

    /// Fetch the uris in endpoint order
    pub async fn uris(&self) -> Result<Vec<String>> {
        let request = match &self.scope {
            ListingScope::Collections(names) => {
                QueryRequest::list().bind(BINDING_COLLECTIONS, names.join(" "))
            }
            ListingScope::Directory(directory) => {
                QueryRequest::list().bind(BINDING_DIRECTORY, directory.clone())
            }
            ListingScope::All => QueryRequest::list(),
        };

        let mut session = self.pool.acquire().await?;
        let items = session.submit(request).await?;
        drop(session);

        let uris: Vec<String> = items
            .into_iter()
            .filter_map(|item| match item {
                ResultItem::Uri(uri) => Some(uri),
                other => {
                    warn!("Ignoring unexpected listing result {:?}", other);
                    None
                }
            })
            .collect();
        debug!("Listed {} uris for {:?}", uris.len(), self.scope);
        Ok(uris)
    }
}
