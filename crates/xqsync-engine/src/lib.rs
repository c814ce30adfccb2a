//! Synchronization engine for XQSync
//!
//! This crate moves documents from a reader to a writer in batches:
//!
//! - **Sources**: where identifiers come from ([`FileTreeSource`], [`SessionListingSource`], [`StaticSource`])
//! - **Scheduling**: [`BatchScheduler`] cuts identifiers into [`SyncTask`]s on a shared queue
//! - **Execution**: [`BatchExecutor`] reads a batch, rewrites metadata and writes each document with retries
//! - **Timing**: [`Timer`] aggregates [`TimedEvent`]s into progress and summary lines
//! - **Orchestration**: [`SyncManager`] runs the workers and honours cancellation
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xqsync_config::Configuration;
//! use xqsync_engine::SyncManager;
//!
//! #[tokio::main]
//! async fn main() -> xqsync_types::Result<()> {
//!     let mut configuration = Configuration::new();
//!     configuration.set_property("INPUT_PATH", "/data/in");
//!     configuration.set_property("OUTPUT_PATH", "/data/out");
//!     configuration.configure().await?;
//!
//!     let configuration = Arc::new(configuration);
//!     let report = SyncManager::new(Arc::clone(&configuration))?.run().await?;
//!     println!("{} documents, {} errors", report.snapshot.events, report.snapshot.errors);
//!     configuration.close().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod document;
pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod source;
pub mod task;
pub mod timer;

pub use document::{OutputUriMapper, XQSyncDocument};
pub use engine::{SyncManager, SyncManagerBuilder, SyncReport};
pub use executor::{BatchExecutor, ExecutorConfig, MetadataTransforms};
pub use scheduler::{BatchScheduler, InFlightGuard, InFlightRegistry};
pub use source::{FileTreeSource, SessionListingSource, StaticSource};
pub use task::{SyncTask, TaskId, TaskOutcome};
pub use timer::{EventTimer, TimedEvent, Timer, TimerSnapshot, DEFAULT_REPORT_INTERVAL};

pub use tokio_util::sync::CancellationToken;
