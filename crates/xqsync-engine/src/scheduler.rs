//! Batch scheduling and destination exclusivity
//!
//! [`BatchScheduler`] cuts the identifier list into [`SyncTask`]s and holds
//! them in a FIFO queue the workers pull from. [`InFlightRegistry`] keeps at
//! most one write per destination identifier running at any time.

use crate::task::SyncTask;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;
use xqsync_types::BatchSize;

/// Shared FIFO work queue of batches
#[derive(Debug)]
pub struct BatchScheduler {
    batch_size: usize,
    queue: Mutex<VecDeque<SyncTask>>,
    scheduled: Mutex<usize>,
}

impl BatchScheduler {
    /// Scheduler cutting batches of `batch_size` identifiers
    pub fn new(batch_size: BatchSize) -> Self {
        Self {
            batch_size: batch_size.get(),
            queue: Mutex::new(VecDeque::new()),
            scheduled: Mutex::new(0),
        }
    }

    /// Queue `identifiers`, dropping duplicates; returns the number of
    /// batches added.
    pub fn schedule<I>(&self, identifiers: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut duplicates = 0usize;
        let unique: Vec<String> = identifiers
            .into_iter()
            .filter(|uri| {
                let fresh = seen.insert(uri.clone());
                if !fresh {
                    duplicates += 1;
                }
                fresh
            })
            .collect();
        if duplicates > 0 {
            debug!("Dropped {} duplicate identifiers", duplicates);
        }

        let mut scheduled = self.scheduled.lock();
        let mut queue = self.queue.lock();
        let mut added = 0;
        for chunk in unique.chunks(self.batch_size) {
            let uris = chunk.iter().cloned().map(Some).collect();
            queue.push_back(SyncTask::new(*scheduled, uris));
            *scheduled += 1;
            added += 1;
        }
        added
    }

    /// Take the next batch
    pub fn next_task(&self) -> Option<SyncTask> {
        self.queue.lock().pop_front()
    }

    /// Batches still queued
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the queue is drained
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Identifiers per batch
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Registry of destination identifiers currently being written
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    active: Mutex<HashSet<String>>,
    released: Notify,
}

impl InFlightRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `uri`, waiting while another holder has it
    pub async fn claim(self: &Arc<Self>, uri: &str) -> InFlightGuard {
        loop {
            let released = self.released.notified();
            if let Some(guard) = self.try_claim(uri) {
                return guard;
            }
            debug!("Waiting for in-flight write of {}", uri);
            released.await;
        }
    }

    /// Claim `uri` if nobody holds it
    pub fn try_claim(self: &Arc<Self>, uri: &str) -> Option<InFlightGuard> {
        if self.active.lock().insert(uri.to_string()) {
            Some(InFlightGuard {
                registry: Arc::clone(self),
                uri: uri.to_string(),
            })
        } else {
            None
        }
    }

    /// Whether `uri` is claimed
    pub fn is_in_flight(&self, uri: &str) -> bool {
        self.active.lock().contains(uri)
    }

    /// Number of claimed identifiers
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    /// Whether nothing is claimed
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

/// Releases its claim when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    uri: String,
}

impl InFlightGuard {
    /// Claimed identifier
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.active.lock().remove(&self.uri);
        self.registry.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    #[case(1, 5, 5)]
    #[case(2, 5, 3)]
    #[case(5, 5, 1)]
    #[case(100, 5, 1)]
    #[case(3, 0, 0)]
    fn test_batch_partitioning(#[case] size: usize, #[case] count: usize, #[case] batches: usize) {
        let scheduler = BatchScheduler::new(BatchSize::new(size).unwrap());
        let identifiers = (0..count).map(|i| format!("/doc{}.xml", i));
        assert_eq!(scheduler.schedule(identifiers), batches);
        assert_eq!(scheduler.len(), batches);
    }

    #[test]
    fn test_fifo_order_and_duplicates() {
        let scheduler = BatchScheduler::new(BatchSize::new(2).unwrap());
        scheduler.schedule(ids(&["a", "b", "a", "c", "b"]));

        let first = scheduler.next_task().unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.uris, vec![Some("a".to_string()), Some("b".to_string())]);
        let second = scheduler.next_task().unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.uris, vec![Some("c".to_string())]);
        assert!(scheduler.next_task().is_none());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_try_claim_is_exclusive() {
        let registry = Arc::new(InFlightRegistry::new());
        let guard = registry.try_claim("/x.xml").unwrap();
        assert!(registry.try_claim("/x.xml").is_none());
        assert!(registry.try_claim("/y.xml").is_some());
        assert!(registry.is_in_flight("/x.xml"));

        drop(guard);
        assert!(!registry.is_in_flight("/x.xml"));
        assert!(registry.try_claim("/x.xml").is_some());
    }

    #[tokio::test]
    async fn test_claim_waits_for_release() {
        let registry = Arc::new(InFlightRegistry::new());
        let guard = registry.claim("/x.xml").await;

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let guard = registry.claim("/x.xml").await;
                guard.uri().to_string()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        let claimed = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed, "/x.xml");
        assert!(registry.is_empty());
    }
}
