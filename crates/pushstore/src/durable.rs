/// DurableBackend: SQLite shards, one row per message.
///
/// Deletes on the request path are no-ops: rows leave the store only
/// through `del_all_expired`, which the sweeper runs on a fixed interval.
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::pool::{Manager, Pool, PoolSet, Pooled};
use crate::router::NodeRouter;
use crate::storage::MessageStorage;
use crate::types::{now_secs, DeletionRequest, Message, SequenceId, SweepReport};

// ── SQL ──────────────────────────────────────────────────────────────────

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS message (
        sub_key    TEXT    NOT NULL,
        group_id   INTEGER NOT NULL DEFAULT 0,
        mid        INTEGER NOT NULL,
        expire_at  INTEGER NOT NULL,
        payload    TEXT    NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_message_key_mid ON message (sub_key, mid);
    CREATE INDEX IF NOT EXISTS idx_message_expire ON message (expire_at);
";

const SAVE_SQL: &str = "INSERT INTO message (sub_key, group_id, mid, expire_at, payload, created_at, updated_at) \
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const GET_SQL: &str =
    "SELECT payload FROM message WHERE sub_key = ?1 AND mid > ?2 AND expire_at > ?3 ORDER BY mid";

const DEL_EXPIRED_SQL: &str = "DELETE FROM message WHERE expire_at <= ?1";

// ── Connections ──────────────────────────────────────────────────────────

/// Dials one SQLite database and makes sure the schema exists.
pub struct SqliteManager {
    path: String,
    busy_timeout: Duration,
}

impl SqliteManager {
    /// `path` is a file path or a `file:` URI.
    pub fn new(path: impl Into<String>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }
}

#[async_trait]
impl Manager for SqliteManager {
    type Connection = Connection;

    async fn connect(&self) -> Result<Connection, StorageError> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(SCHEMA_SQL)?;
            Ok(conn)
        })
        .await??;
        Ok(conn)
    }
}

/// Run `f` against a pooled connection on the blocking thread pool.
async fn with_conn<T, F>(conn: Pooled<SqliteManager>, f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(&*conn)).await?;
    Ok(result?)
}

// ── Backend ──────────────────────────────────────────────────────────────

pub struct DurableBackend {
    router: NodeRouter,
    pools: PoolSet<SqliteManager>,
}

impl DurableBackend {
    pub fn new(router: NodeRouter, pools: PoolSet<SqliteManager>) -> Self {
        Self { router, pools }
    }

    /// Build pools for every configured node and dial each once, so a bad
    /// path fails here rather than on the first request.
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let router = NodeRouter::new(config.nodes.keys().cloned(), config.ring_weight)?;
        let busy_timeout = config.durable.busy_timeout();
        let pools: PoolSet<SqliteManager> = config
            .nodes
            .iter()
            .map(|(name, path)| {
                Pool::new(name.clone(), SqliteManager::new(path.clone(), busy_timeout), &config.pool)
            })
            .collect();

        for (node, pool) in pools.iter() {
            if let Err(e) = pool.acquire().await {
                tracing::error!("durable node {node} failed to open: {e}");
                return Err(e);
            }
            tracing::debug!("durable node {node} ready");
        }

        Ok(Self::new(router, pools))
    }

    pub fn router(&self) -> &NodeRouter {
        &self.router
    }

    fn pool_for(&self, key: &str) -> Result<&Pool<SqliteManager>, StorageError> {
        let node = self.router.resolve(key)?;
        match self.pools.get(node) {
            Some(pool) => {
                tracing::debug!("key {key:?} hit node {node:?}");
                Ok(pool)
            }
            None => {
                tracing::warn!("no database pool for node {node:?} (key {key:?})");
                Err(StorageError::NoConnection {
                    node: node.to_string(),
                })
            }
        }
    }

    async fn delete_expired_on(pool: &Pool<SqliteManager>, now: i64) -> Result<usize, StorageError> {
        let conn = pool.acquire().await?;
        with_conn(conn, move |c| c.execute(DEL_EXPIRED_SQL, params![now])).await
    }
}

#[async_trait]
impl MessageStorage for DurableBackend {
    async fn save(&self, key: &str, msg: &Message, mid: SequenceId) -> Result<(), StorageError> {
        let pool = self.pool_for(key)?;
        let payload = msg.encode()?;
        let conn = pool.acquire().await?;

        let sub_key = key.to_string();
        let expire = msg.expire;
        let now = now_secs();
        if msg.is_expired(now) {
            tracing::debug!("key {key:?} mid {mid} saved already expired; hidden until swept");
        }
        with_conn(conn, move |c| {
            c.prepare_cached(SAVE_SQL)?
                .execute(params![sub_key, 0i64, mid, expire, payload, now, now])
        })
        .await
        .map(|_| ())
        .inspect_err(|e| tracing::error!("save key {key:?} mid {mid} failed: {e}"))
    }

    async fn get(&self, key: &str, mid: SequenceId) -> Result<Vec<String>, StorageError> {
        let pool = self.pool_for(key)?;
        let conn = pool.acquire().await?;

        let sub_key = key.to_string();
        let now = now_secs();
        with_conn(conn, move |c| {
            let mut stmt = c.prepare_cached(GET_SQL)?;
            let rows = stmt.query_map(params![sub_key, mid, now], |row| row.get::<_, String>(0))?;
            let payloads = rows.collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(payloads)
        })
        .await
        .inspect_err(|e| tracing::error!("get key {key:?} mid {mid} failed: {e}"))
    }

    async fn del_multi(&self, request: &DeletionRequest) -> Result<(), StorageError> {
        // Deferred to the expiry sweep.
        tracing::trace!(
            "ignoring delete of {} message(s) on key {:?}",
            request.msgs.len(),
            request.key
        );
        Ok(())
    }

    async fn del_key(&self, key: &str) -> Result<(), StorageError> {
        // Deferred to the expiry sweep.
        tracing::trace!("ignoring delete of key {key:?}");
        Ok(())
    }

    /// Delete expired rows on every node. Each node is attempted even if an
    /// earlier one failed; the first failure is returned.
    async fn del_all_expired(&self) -> Result<SweepReport, StorageError> {
        let now = now_secs();
        let mut report = SweepReport::default();
        let mut first_err = None;

        for (node, pool) in self.pools.iter() {
            match Self::delete_expired_on(pool, now).await {
                Ok(removed) => {
                    report.nodes += 1;
                    report.removed += removed as u64;
                    tracing::debug!("node {node}: removed {removed} expired message(s)");
                }
                Err(e) => {
                    tracing::warn!("node {node}: delete expired messages failed: {e}");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
