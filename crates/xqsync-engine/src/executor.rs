//! Runs one batch: read, transform, write, retry

use crate::document::{OutputUriMapper, XQSyncDocument};
use crate::scheduler::InFlightRegistry;
use crate::task::{SyncTask, TaskOutcome};
use crate::timer::{EventTimer, Timer};
use std::sync::Arc;
use tracing::{debug, error, warn};
use xqsync_config::Configuration;
use xqsync_types::{
    Capability, DocumentMetadata, DocumentReader, DocumentWriter, Error, Permission, Result,
    RetryConfig,
};

/// Metadata rewrites applied to every document before it is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTransforms {
    /// Keep the source permissions
    pub copy_permissions: bool,
    /// Keep the source properties
    pub copy_properties: bool,
    /// Collections every output document joins
    pub output_collections: Vec<String>,
    /// Roles granted read on every output document
    pub read_permission_roles: Vec<String>,
}

impl Default for MetadataTransforms {
    fn default() -> Self {
        Self {
            copy_permissions: true,
            copy_properties: true,
            output_collections: Vec::new(),
            read_permission_roles: Vec::new(),
        }
    }
}

impl MetadataTransforms {
    /// Transforms described by the configuration
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self {
            copy_permissions: configuration.copy_permissions(),
            copy_properties: configuration.copy_properties(),
            output_collections: configuration.output_collections(),
            read_permission_roles: configuration.read_permission_roles(),
        }
    }

    /// Rewrite `metadata` in place. Applying twice changes nothing more.
    pub fn apply(&self, metadata: &mut DocumentMetadata) {
        if !self.copy_permissions {
            metadata.clear_permissions();
        }
        if !self.copy_properties {
            metadata.properties.clear();
        }
        for collection in &self.output_collections {
            metadata.add_collection(collection.clone());
        }
        for role in &self.read_permission_roles {
            metadata.add_permission(Permission::new(role.clone(), Capability::Read));
        }
    }
}

/// Per-run knobs of the executor
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Backoff for recoverable failures
    pub retry: RetryConfig,
    /// Leave documents the destination already holds
    pub skip_existing: bool,
    /// Escalate exhausted per-document failures to an abort
    pub fatal_errors: bool,
    /// Metadata rewrites
    pub transforms: MetadataTransforms,
}

impl ExecutorConfig {
    /// Knobs described by the configuration
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self {
            retry: configuration.retry_config(),
            skip_existing: configuration.skip_existing(),
            fatal_errors: configuration.fatal_errors(),
            transforms: MetadataTransforms::from_configuration(configuration),
        }
    }
}

enum DocumentOutcome {
    Written(u64),
    Skipped,
}

/// Executes [`SyncTask`]s against a reader and a writer
pub struct BatchExecutor {
    reader: Arc<dyn DocumentReader>,
    writer: Arc<dyn DocumentWriter>,
    mapper: OutputUriMapper,
    timer: Arc<Timer>,
    in_flight: Arc<InFlightRegistry>,
    config: ExecutorConfig,
}

impl BatchExecutor {
    /// Executor moving documents from `reader` to `writer`
    pub fn new(
        reader: Arc<dyn DocumentReader>,
        writer: Arc<dyn DocumentWriter>,
        mapper: OutputUriMapper,
        timer: Arc<Timer>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            reader,
            writer,
            mapper,
            timer,
            in_flight: Arc::new(InFlightRegistry::new()),
            config,
        }
    }

    /// Registry guarding destination identifiers
    pub fn in_flight(&self) -> &Arc<InFlightRegistry> {
        &self.in_flight
    }

    /// Run one task.
    ///
    /// Per-document failures are recorded in the timer and counted in the
    /// outcome. An `Err` means the run must stop: either the error is fatal,
    /// or `fatal_errors` escalated an exhausted failure.
    pub async fn execute(&self, task: SyncTask) -> Result<TaskOutcome> {
        debug!(
            "Task {} (batch {}): {} documents",
            task.id,
            task.sequence,
            task.document_count()
        );
        let mut batch = XQSyncDocument::new(
            task.uris,
            Arc::clone(&self.reader),
            Arc::clone(&self.writer),
            self.mapper.clone(),
        );
        let mut outcome = TaskOutcome::default();

        if let Err(e) = self.read_batch(&mut batch).await {
            if e.is_fatal() {
                return Err(e);
            }
            for uri in (0..batch.len()).filter_map(|index| batch.uri(index)) {
                error!("Failed to read {}: {}", uri, e);
                self.timer.add(EventTimer::start(uri).finish(0, true));
                outcome.failed += 1;
            }
            return if self.config.fatal_errors {
                Err(e)
            } else {
                Ok(outcome)
            };
        }

        for index in 0..batch.len() {
            let Some(uri) = batch.uri(index).map(str::to_string) else {
                continue;
            };
            let event = EventTimer::start(uri.as_str());
            match self.sync_document(&mut batch, index).await {
                Ok(DocumentOutcome::Written(bytes)) => {
                    debug!("Synchronized {} ({} bytes)", uri, bytes);
                    self.timer.add(event.finish(bytes, false));
                    outcome.written += 1;
                    outcome.bytes += bytes;
                }
                Ok(DocumentOutcome::Skipped) => {
                    debug!("Skipped {}: destination exists", uri);
                    self.timer.add(event.discard().finish(0, false));
                    outcome.skipped += 1;
                }
                Err(e) => {
                    self.timer.add(event.finish(0, true));
                    outcome.failed += 1;
                    if e.is_fatal() {
                        return Err(e);
                    }
                    error!("Failed to synchronize {}: {}", uri, e);
                    if self.config.fatal_errors {
                        return Err(e);
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn read_batch(&self, batch: &mut XQSyncDocument) -> Result<()> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match batch.read().await {
                Ok(()) => return Ok(()),
                Err(e) if e.should_retry() && attempt < retry.max_retries => {
                    warn!(
                        "Retrying batch read (attempt {}/{}): {}",
                        attempt + 2,
                        retry.max_attempts(),
                        e
                    );
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn sync_document(
        &self,
        batch: &mut XQSyncDocument,
        index: usize,
    ) -> Result<DocumentOutcome> {
        let output_uri = batch
            .output_uri(index)
            .ok_or_else(|| Error::other(format!("No document in slot {}", index)))?;
        let _claim = self.in_flight.claim(&output_uri).await;

        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match self.attempt_document(batch, index, attempt).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.should_retry() && attempt < retry.max_retries => {
                    warn!(
                        "Retrying {} (attempt {}/{}): {}",
                        output_uri,
                        attempt + 2,
                        retry.max_attempts(),
                        e
                    );
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_document(
        &self,
        batch: &mut XQSyncDocument,
        index: usize,
        attempt: u32,
    ) -> Result<DocumentOutcome> {
        let loaded = batch.document(index).is_some_and(|document| document.is_loaded());
        if !loaded && attempt > 0 {
            batch.reread(index).await?;
        }
        if let Some(error) = batch.document(index).and_then(|document| document.read_error()) {
            return Err(error);
        }

        if self.config.skip_existing && batch.output_exists(index).await? {
            return Ok(DocumentOutcome::Skipped);
        }

        if let Some(metadata) = batch.metadata_mut(index) {
            self.config.transforms.apply(metadata);
        }
        batch.write(index).await.map(DocumentOutcome::Written)
    }
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("mapper", &self.mapper)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
