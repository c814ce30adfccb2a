//! Units of work handed to the engine's workers

use std::fmt;
use uuid::Uuid;

/// Unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One batch of source identifiers to synchronize together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    /// Task id, used to correlate log lines
    pub id: TaskId,
    /// Position of the batch in scheduling order
    pub sequence: usize,
    /// Identifiers in the batch; `None` slots are skipped
    pub uris: Vec<Option<String>>,
}

impl SyncTask {
    /// Task over `uris`
    pub fn new(sequence: usize, uris: Vec<Option<String>>) -> Self {
        Self {
            id: TaskId::new(),
            sequence,
            uris,
        }
    }

    /// Number of identifiers actually present
    pub fn document_count(&self) -> usize {
        self.uris.iter().flatten().count()
    }
}

/// What running one task produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Documents written
    pub written: u64,
    /// Documents left alone because the destination already had them
    pub skipped: u64,
    /// Documents that failed after every attempt
    pub failed: u64,
    /// Bytes written
    pub bytes: u64,
}

impl TaskOutcome {
    /// Fold `other` into `self`
    pub fn merge(&mut self, other: &Self) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.bytes += other.bytes;
    }
}
