//! Run orchestration

use crate::document::OutputUriMapper;
use crate::executor::{BatchExecutor, ExecutorConfig};
use crate::scheduler::BatchScheduler;
use crate::source::{FileTreeSource, SessionListingSource, StaticSource};
use crate::task::TaskOutcome;
use crate::timer::{Timer, TimerSnapshot, DEFAULT_REPORT_INTERVAL};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xqsync_config::Configuration;
use xqsync_io::{FilePathReader, FilePathWriter};
use xqsync_session::{ListingScope, SessionListing, SessionReader, SessionWriter};
use xqsync_types::{DocumentReader, DocumentWriter, Error, IdentifierSource, Result};

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Timer totals at the end of the run
    pub snapshot: TimerSnapshot,
    /// Per-task counts, summed
    pub outcome: TaskOutcome,
    /// Batches scheduled
    pub batches: usize,
    /// Batches never started because the run was cancelled
    pub undispatched: usize,
    /// Whether the run was cancelled
    pub cancelled: bool,
    /// `ERROR_TOLERANCE`, if set
    pub error_tolerance: Option<u64>,
}

impl SyncReport {
    /// Whether more documents failed than the configured tolerance allows
    pub fn exceeds_tolerance(&self) -> bool {
        self.error_tolerance
            .is_some_and(|tolerance| self.snapshot.errors > tolerance)
    }
}

/// Builds a [`SyncManager`], taking components from the configuration unless
/// they are injected.
pub struct SyncManagerBuilder {
    configuration: Arc<Configuration>,
    reader: Option<Arc<dyn DocumentReader>>,
    writer: Option<Arc<dyn DocumentWriter>>,
    source: Option<Arc<dyn IdentifierSource>>,
    timer: Option<Arc<Timer>>,
    cancel: CancellationToken,
}

impl SyncManagerBuilder {
    /// Builder over a configured [`Configuration`]
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self {
            configuration,
            reader: None,
            writer: None,
            source: None,
            timer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Read documents through `reader`
    pub fn reader(mut self, reader: Arc<dyn DocumentReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Write documents through `writer`
    pub fn writer(mut self, writer: Arc<dyn DocumentWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Take identifiers from `source`
    pub fn source(mut self, source: Arc<dyn IdentifierSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Synchronize exactly `uris`
    pub fn identifiers<I, S>(self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source(Arc::new(StaticSource::new(uris)))
    }

    /// Record events in `timer`
    pub fn timer(mut self, timer: Arc<Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Stop dispatching new batches once `token` is cancelled
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Resolve every component
    pub fn build(self) -> Result<SyncManager> {
        let configuration = self.configuration;
        if !configuration.is_configured() {
            return Err(Error::config("configuration has not been configured"));
        }

        let reader = match self.reader {
            Some(reader) => reader,
            None => default_reader(&configuration)?,
        };
        let writer = match self.writer {
            Some(writer) => writer,
            None => default_writer(&configuration)?,
        };
        let source = match self.source {
            Some(source) => source,
            None => default_source(&configuration)?,
        };
        let timer = self
            .timer
            .unwrap_or_else(|| Arc::new(Timer::with_report_interval(DEFAULT_REPORT_INTERVAL)));

        Ok(SyncManager {
            configuration,
            reader,
            writer,
            source,
            timer,
            cancel: self.cancel,
        })
    }
}

fn default_reader(configuration: &Configuration) -> Result<Arc<dyn DocumentReader>> {
    if let Some(path) = configuration.input_path() {
        return Ok(Arc::new(FilePathReader::new(path)));
    }
    if let Some(pool) = configuration.input_pool() {
        return Ok(Arc::new(
            SessionReader::new(pool.clone())
                .with_permissions(configuration.copy_permissions())
                .with_properties(configuration.copy_properties()),
        ));
    }
    Err(Error::config("no input: set INPUT_PATH or INPUT_CONNECTION_STRING"))
}

fn default_writer(configuration: &Configuration) -> Result<Arc<dyn DocumentWriter>> {
    if let Some(path) = configuration.output_path() {
        return Ok(Arc::new(FilePathWriter::new(path)));
    }
    if let Some(pool) = configuration.output_pool() {
        return Ok(Arc::new(SessionWriter::new(pool.clone())));
    }
    Err(Error::config("no output: set OUTPUT_PATH or OUTPUT_CONNECTION_STRING"))
}

fn default_source(configuration: &Configuration) -> Result<Arc<dyn IdentifierSource>> {
    if let Some(path) = configuration.input_path() {
        return Ok(Arc::new(
            FileTreeSource::new(path)
                .with_include(configuration.include_pattern())
                .with_exclude(configuration.exclude_pattern()),
        ));
    }
    if let Some(pool) = configuration.input_pool() {
        let scope = match (
            configuration.input_collection_uris(),
            configuration.input_directory_uri(),
        ) {
            (Some(collections), _) => ListingScope::Collections(collections),
            (None, Some(directory)) => ListingScope::Directory(directory.to_string()),
            (None, None) => ListingScope::All,
        };
        return Ok(Arc::new(SessionListingSource::new(SessionListing::new(
            pool.clone(),
            scope,
        ))));
    }
    Err(Error::config("no input: set INPUT_PATH or INPUT_CONNECTION_STRING"))
}

/// Drives one synchronization run
pub struct SyncManager {
    configuration: Arc<Configuration>,
    reader: Arc<dyn DocumentReader>,
    writer: Arc<dyn DocumentWriter>,
    source: Arc<dyn IdentifierSource>,
    timer: Arc<Timer>,
    cancel: CancellationToken,
}

impl SyncManager {
    /// Manager with every component taken from `configuration`
    pub fn new(configuration: Arc<Configuration>) -> Result<Self> {
        SyncManagerBuilder::new(configuration).build()
    }

    /// Builder for injecting components
    pub fn builder(configuration: Arc<Configuration>) -> SyncManagerBuilder {
        SyncManagerBuilder::new(configuration)
    }

    /// Timer recording this run's events
    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// Token that stops dispatch when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The run's configuration
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Identifiers the source yields, without synchronizing anything
    pub async fn identifiers(&self) -> Result<Vec<String>> {
        self.source.identifiers().await
    }

    /// Describe where identifiers come from
    pub fn describe_source(&self) -> String {
        self.source.describe()
    }

    /// Synchronize every identifier the source yields.
    ///
    /// Workers stop taking batches once the cancellation token fires; batches
    /// already started run to completion. A fatal error stops dispatch and is
    /// returned once every worker has finished.
    pub async fn run(&self) -> Result<SyncReport> {
        let configuration = &self.configuration;
        info!("Listing {}", self.source.describe());
        let identifiers = match self.source.identifiers().await {
            Ok(identifiers) => identifiers,
            Err(e) => {
                error!("Aborting run: {}", e);
                info!("{}", self.timer.final_summary());
                return Err(e);
            }
        };
        let total = identifiers.len();

        let scheduler = Arc::new(BatchScheduler::new(configuration.batch_size()));
        let batches = scheduler.schedule(identifiers);
        let workers = configuration.thread_count().get().min(batches).max(1);
        info!(
            "Synchronizing {} documents in {} batches with {} workers",
            total, batches, workers
        );

        let executor = Arc::new(BatchExecutor::new(
            Arc::clone(&self.reader),
            Arc::clone(&self.writer),
            OutputUriMapper::from_configuration(configuration),
            Arc::clone(&self.timer),
            ExecutorConfig::from_configuration(configuration),
        ));

        let dispatch = self.cancel.child_token();
        let mut progress = JoinSet::new();
        progress.spawn(self.progress_reporter());

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let scheduler = Arc::clone(&scheduler);
            let executor = Arc::clone(&executor);
            let dispatch = dispatch.clone();
            set.spawn(async move {
                let mut outcome = TaskOutcome::default();
                while !dispatch.is_cancelled() {
                    let Some(task) = scheduler.next_task() else {
                        break;
                    };
                    match executor.execute(task).await {
                        Ok(done) => outcome.merge(&done),
                        Err(e) => {
                            dispatch.cancel();
                            return Err(e);
                        }
                    }
                }
                debug!("Worker {} finished", worker);
                Ok(outcome)
            });
        }

        let mut outcome = TaskOutcome::default();
        let mut fatal = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| Error::other(format!("Worker failed: {}", e)));
            match result.and_then(|worker_result| worker_result) {
                Ok(done) => outcome.merge(&done),
                Err(e) => {
                    dispatch.cancel();
                    if fatal.is_none() {
                        error!("Aborting run: {}", e);
                        fatal = Some(e);
                    }
                }
            }
        }
        progress.abort_all();

        info!("{}", self.timer.final_summary());
        if let Some(e) = fatal {
            return Err(e);
        }

        let cancelled = self.cancel.is_cancelled();
        let undispatched = scheduler.len();
        if cancelled {
            warn!("Run cancelled with {} batches not started", undispatched);
        }

        let report = SyncReport {
            snapshot: self.timer.snapshot(),
            outcome,
            batches,
            undispatched,
            cancelled,
            error_tolerance: configuration.error_tolerance(),
        };
        if report.exceeds_tolerance() {
            warn!(
                "{} errors exceed the tolerance of {}",
                report.snapshot.errors,
                report.error_tolerance.unwrap_or_default()
            );
        }
        Ok(report)
    }

    /// Periodic progress logging; runs until its task is aborted
    fn progress_reporter(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let timer = Arc::clone(&self.timer);
        let period = timer
            .report_interval()
            .min(Duration::from_secs(1))
            .max(Duration::from_millis(10));
        async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Some(message) = timer.progress_message() {
                    info!("{}", message);
                }
            }
        }
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("source", &self.source.describe())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;
    use xqsync_config::keys;
    use xqsync_types::{Document, DocumentContent, DocumentMetadata};

    async fn fs_configuration(
        input: &TempDir,
        output: &TempDir,
        extra: &[(&str, &str)],
    ) -> Arc<Configuration> {
        let mut configuration = Configuration::new();
        configuration.set_property(keys::INPUT_PATH, input.path().to_string_lossy());
        configuration.set_property(keys::OUTPUT_PATH, output.path().to_string_lossy());
        for (key, value) in extra {
            configuration.set_property(*key, *value);
        }
        configuration.configure().await.unwrap();
        Arc::new(configuration)
    }

    #[tokio::test]
    async fn test_unconfigured_is_rejected() {
        let error = SyncManager::new(Arc::new(Configuration::new())).unwrap_err();
        assert!(error.is_fatal());
    }

    #[tokio::test]
    async fn test_directory_copy() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::create_dir_all(input.path().join("nested")).unwrap();
        fs::write(input.path().join("a.xml"), "<a/>").unwrap();
        fs::write(input.path().join("nested/b.json"), "{}").unwrap();

        let configuration = fs_configuration(
            &input,
            &output,
            &[(keys::THREADS, "2"), (keys::INPUT_BATCH_SIZE, "1")],
        )
        .await;
        let manager = SyncManager::new(Arc::clone(&configuration)).unwrap();
        let report = manager.run().await.unwrap();

        assert_eq!(report.snapshot.events, 2);
        assert_eq!(report.snapshot.errors, 0);
        assert_eq!(report.outcome.written, 2);
        assert_eq!(report.batches, 2);
        assert!(!report.cancelled);
        assert!(!report.exceeds_tolerance());
        assert_eq!(fs::read(output.path().join("a.xml")).unwrap(), b"<a/>");
        assert_eq!(fs::read(output.path().join("nested/b.json")).unwrap(), b"{}");
        configuration.close().await;
    }

    #[tokio::test]
    async fn test_missing_identifiers_counted_against_tolerance() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::write(input.path().join("here.xml"), "<h/>").unwrap();

        let configuration =
            fs_configuration(&input, &output, &[(keys::ERROR_TOLERANCE, "0")]).await;
        let manager = SyncManager::builder(configuration)
            .identifiers(["here.xml", "gone.xml"])
            .build()
            .unwrap();
        let report = manager.run().await.unwrap();

        assert_eq!(report.snapshot.events, 2);
        assert_eq!(report.snapshot.errors, 1);
        assert!(report.exceeds_tolerance());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::write(input.path().join("a.xml"), "<a/>").unwrap();

        let configuration = fs_configuration(&input, &output, &[]).await;
        let token = CancellationToken::new();
        token.cancel();
        let manager = SyncManager::builder(configuration)
            .cancellation_token(token)
            .build()
            .unwrap();
        let report = manager.run().await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.undispatched, 1);
        assert_eq!(report.snapshot.events, 0);
        assert!(!output.path().join("a.xml").exists());
    }

    struct BrokenWriter;

    #[async_trait]
    impl DocumentWriter for BrokenWriter {
        async fn write(&self, _: &str, _: &DocumentContent, _: &DocumentMetadata) -> Result<u64> {
            Err(Error::output_root("/nowhere", "gone"))
        }

        async fn exists(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    struct BlankReader;

    #[async_trait]
    impl DocumentReader for BlankReader {
        async fn read(&self, batch: &mut [Option<Document>]) -> Result<()> {
            for document in batch.iter_mut().flatten() {
                document.load(DocumentContent::from("x"), DocumentMetadata::new());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fatal_error_propagates() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let configuration = fs_configuration(&input, &output, &[(keys::THREADS, "4")]).await;

        let manager = SyncManager::builder(configuration)
            .reader(Arc::new(BlankReader))
            .writer(Arc::new(BrokenWriter))
            .identifiers((0..20).map(|i| format!("/{}.xml", i)))
            .build()
            .unwrap();
        let error = manager.run().await.unwrap_err();
        assert!(matches!(error, Error::OutputRootUnavailable { .. }));
        assert!(manager.timer().event_count() < 20);
        assert!(!manager.cancellation_token().is_cancelled());
    }

    struct UnreachableSource;

    #[async_trait]
    impl IdentifierSource for UnreachableSource {
        async fn identifiers(&self) -> Result<Vec<String>> {
            Err(Error::session("listing request timed out"))
        }

        fn describe(&self) -> String {
            "unreachable listing".to_string()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_listing_failure_still_logs_summary() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let configuration = fs_configuration(&input, &output, &[]).await;

        let manager = SyncManager::builder(configuration)
            .source(Arc::new(UnreachableSource))
            .build()
            .unwrap();
        let error = manager.run().await.unwrap_err();

        assert!(matches!(error, Error::Session { .. }));
        assert!(logs_contain("Aborting run"));
        assert!(logs_contain("Synchronized 0 documents"));
    }

    struct StalledWriter;

    #[async_trait]
    impl DocumentWriter for StalledWriter {
        async fn write(&self, _: &str, _: &DocumentContent, _: &DocumentMetadata) -> Result<u64> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }

        async fn exists(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_dropped_run_releases_background_tasks() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let configuration = fs_configuration(&input, &output, &[(keys::THREADS, "2")]).await;

        let manager = SyncManager::builder(configuration)
            .reader(Arc::new(BlankReader))
            .writer(Arc::new(StalledWriter))
            .identifiers(["/a.xml", "/b.xml"])
            .build()
            .unwrap();
        let timer = Arc::clone(manager.timer());

        let run = tokio::time::timeout(Duration::from_millis(50), manager.run()).await;
        assert!(run.is_err());

        // Aborted tasks drop their futures on the next scheduler pass
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(Arc::strong_count(&timer), 2);
    }
}
