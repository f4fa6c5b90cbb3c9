//! Per-node connection pools.
//!
//! One [`Pool`] per backend node, created at startup and never resized.
//! Checkout blocks only when `max_active` connections are already out.

use std::collections::{BTreeMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::StorageError;

// ── Configuration ─────────────────────────────────────────────────────

/// Sizing shared by every node's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections kept for reuse.
    pub max_idle: usize,
    /// Connections checked out at once. 0 = unbounded.
    pub max_active: usize,
    /// Idle connections older than this are closed. 0 = never.
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 10,
            max_active: 50,
            idle_timeout_secs: 240,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

// ── Manager ───────────────────────────────────────────────────────────

/// Dials connections for one node.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, StorageError>;
}

// ── Pool ──────────────────────────────────────────────────────────────

struct Idle<C> {
    conn: C,
    returned_at: Instant,
}

struct PoolInner<M: Manager> {
    node: String,
    manager: M,
    max_idle: usize,
    idle_timeout: Option<Duration>,
    idle: Mutex<VecDeque<Idle<M::Connection>>>,
    permits: Arc<Semaphore>,
}

impl<M: Manager> PoolInner<M> {
    /// Most recently returned connection that is still fresh.
    fn take_idle(&self) -> Option<M::Connection> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = idle.pop_back()?;
        if let Some(timeout) = self.idle_timeout {
            if entry.returned_at.elapsed() > timeout {
                // Entries further back were returned earlier, so they are stale too.
                let closed = idle.len() + 1;
                idle.clear();
                tracing::debug!("pool {}: closed {closed} stale idle connection(s)", self.node);
                return None;
            }
        }
        Some(entry.conn)
    }

    fn put_back(&self, conn: M::Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push_back(Idle {
                conn,
                returned_at: Instant::now(),
            });
        }
    }
}

/// Connection pool for a single node. Cheap to clone.
pub struct Pool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Manager> Pool<M> {
    pub fn new(node: impl Into<String>, manager: M, config: &PoolConfig) -> Self {
        let max_active = match config.max_active {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        Self {
            inner: Arc::new(PoolInner {
                node: node.into(),
                manager,
                max_idle: config.max_idle,
                idle_timeout: config.idle_timeout(),
                idle: Mutex::new(VecDeque::new()),
                permits: Arc::new(Semaphore::new(max_active)),
            }),
        }
    }

    /// Node this pool dials.
    pub fn node(&self) -> &str {
        &self.inner.node
    }

    /// Check out a connection, reusing an idle one when possible.
    ///
    /// Waits while `max_active` connections are checked out.
    pub async fn acquire(&self) -> Result<Pooled<M>, StorageError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| StorageError::PoolClosed {
                node: self.inner.node.clone(),
            })?;

        let conn = match self.inner.take_idle() {
            Some(conn) => conn,
            None => {
                tracing::debug!("pool {}: dialing new connection", self.inner.node);
                self.inner.manager.connect().await?
            }
        };

        Ok(Pooled {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Idle connections currently held.
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A checked-out connection. Returned to its pool on drop.
pub struct Pooled<M: Manager> {
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: Manager> Pooled<M> {
    /// Close the connection instead of returning it (after a transport error).
    pub fn discard(mut self) {
        self.conn.take();
        tracing::debug!("pool {}: discarded broken connection", self.pool.node);
    }
}

impl<M: Manager> Deref for Pooled<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<M: Manager> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<M: Manager> Drop for Pooled<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}

// ── PoolSet ───────────────────────────────────────────────────────────

/// Node name → pool. Built once, read-only afterwards.
pub struct PoolSet<M: Manager> {
    pools: BTreeMap<String, Pool<M>>,
}

impl<M: Manager> PoolSet<M> {
    pub fn get(&self, node: &str) -> Option<&Pool<M>> {
        self.pools.get(node)
    }

    /// Pools in node-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Pool<M>)> {
        self.pools.iter().map(|(name, pool)| (name.as_str(), pool))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<M: Manager> FromIterator<Pool<M>> for PoolSet<M> {
    fn from_iter<T: IntoIterator<Item = Pool<M>>>(iter: T) -> Self {
        Self {
            pools: iter
                .into_iter()
                .map(|pool| (pool.node().to_string(), pool))
                .collect(),
        }
    }
}
