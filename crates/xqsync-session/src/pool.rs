//! Session pooling
//!
//! Workers borrow sessions from a [`SessionPool`] instead of connecting per
//! document. A semaphore bounds concurrent sessions; a borrowed session goes
//! back to the idle list when its [`PooledSession`] guard drops.

use crate::{ConnectionString, QueryRequest, ResultItem, Session, SessionConnector};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use xqsync_types::{Error, Result};

/// Session pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum sessions open at once
    pub max_sessions: usize,
    /// How long `acquire` waits for a free session
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 8,
            acquire_timeout: Duration::from_secs(60),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured maximum
    pub max_sessions: usize,
    /// Sessions currently borrowed
    pub in_use: usize,
    /// Sessions waiting in the idle list
    pub idle: usize,
    /// Sessions established over the pool's lifetime
    pub created: usize,
}

struct PoolInner {
    connection: ConnectionString,
    connector: Arc<dyn SessionConnector>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn Session>>>,
    created: AtomicUsize,
    closed: AtomicBool,
}

/// Bounded pool of sessions to one endpoint
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Open a pool, establishing the first session eagerly.
    ///
    /// Failure to connect is fatal: the endpoint is unusable for the whole run.
    pub async fn open(
        connection: ConnectionString,
        connector: Arc<dyn SessionConnector>,
        config: PoolConfig,
    ) -> Result<Self> {
        let max_sessions = config.max_sessions.max(1);
        let first = connector
            .connect(&connection)
            .await
            .map_err(|e| Error::ConnectionRefused {
                endpoint: connection.endpoint(),
                message: e.to_string(),
            })?;

        info!(
            "Opened session pool to {} (max {} sessions)",
            connection.endpoint(),
            max_sessions
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                connection,
                connector,
                config: PoolConfig {
                    max_sessions,
                    ..config
                },
                permits: Arc::new(Semaphore::new(max_sessions)),
                idle: Mutex::new(vec![first]),
                created: AtomicUsize::new(1),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Borrow a session, connecting a new one when none is idle
    pub async fn acquire(&self) -> Result<PooledSession> {
        if self.is_closed() {
            return Err(Error::session("session pool is closed"));
        }

        let timeout = self.inner.config.acquire_timeout;
        let permit = tokio::time::timeout(timeout, self.inner.permits.clone().acquire_owned())
            .await
            .map_err(|_| Error::Timeout {
                seconds: timeout.as_secs(),
            })?
            .map_err(|_| Error::session("session pool is closed"))?;

        let reused = {
            let mut idle = self.inner.idle.lock();
            let mut found = None;
            while let Some(session) = idle.pop() {
                if session.is_alive() {
                    found = Some(session);
                    break;
                }
                debug!("Discarding dead session to {}", self.inner.connection.endpoint());
            }
            found
        };

        let session = match reused {
            Some(session) => session,
            None => {
                let session = self
                    .inner
                    .connector
                    .connect(&self.inner.connection)
                    .await
                    .map_err(|e| {
                        Error::session(format!(
                            "Failed to connect to {}: {}",
                            self.inner.connection.endpoint(),
                            e
                        ))
                    })?;
                self.inner.created.fetch_add(1, Ordering::Relaxed);
                debug!("Opened new session to {}", self.inner.connection.endpoint());
                session
            }
        };

        Ok(PooledSession {
            session: Some(session),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Close every idle session and refuse further borrowing. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.permits.close();

        let sessions = std::mem::take(&mut *self.inner.idle.lock());
        for mut session in sessions {
            if let Err(e) = session.close().await {
                warn!(
                    "Failed to close session to {}: {}",
                    self.inner.connection.endpoint(),
                    e
                );
            }
        }
        info!("Closed session pool to {}", self.inner.connection.endpoint());
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Endpoint this pool connects to
    pub fn connection(&self) -> &ConnectionString {
        &self.inner.connection
    }

    /// Current statistics
    pub fn stats(&self) -> PoolStats {
        let max_sessions = self.inner.config.max_sessions;
        PoolStats {
            max_sessions,
            in_use: max_sessions.saturating_sub(self.inner.permits.available_permits()),
            idle: self.inner.idle.lock().len(),
            created: self.inner.created.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("connection", &self.inner.connection)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A borrowed session, returned to its pool on drop
pub struct PooledSession {
    session: Option<Box<dyn Session>>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    /// Submit a request on the borrowed session
    pub async fn submit(&mut self, request: QueryRequest) -> Result<Vec<ResultItem>> {
        match self.session.as_mut() {
            Some(session) => session.submit(request).await,
            None => Err(Error::session("session already released")),
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.is_alive() && !self.pool.closed.load(Ordering::SeqCst) {
                self.pool.idle.lock().push(session);
            }
        }
    }
}
