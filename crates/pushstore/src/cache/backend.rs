/// CacheBackend: one sorted set per key, scored by sequence id.
///
/// Expiry here is size-based: every save trims the key back to
/// `max_store` members, dropping the lowest sequence ids. Nothing reads
/// the `expire` field, and there is no sweep.
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::command::{BatchOutcome, Command, Replies, Reply};
use crate::cache::connection::{CacheConnector, CacheManager};
use crate::cache::memory::MemoryCache;
use crate::config::StorageConfig;
use crate::error::{CacheError, StorageError};
use crate::pool::{Pool, PoolSet};
use crate::router::NodeRouter;
use crate::storage::MessageStorage;
use crate::types::{DeletionRequest, Message, SequenceId, SweepReport};

pub struct CacheBackend {
    router: NodeRouter,
    pools: PoolSet<CacheManager>,
    max_store: usize,
}

impl CacheBackend {
    pub fn new(router: NodeRouter, pools: PoolSet<CacheManager>, max_store: usize) -> Self {
        Self {
            router,
            pools,
            max_store,
        }
    }

    /// Backend over one in-process [`MemoryCache`] per configured node.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let connectors = config
            .nodes
            .keys()
            .map(|name| {
                let connector: Arc<dyn CacheConnector> = Arc::new(MemoryCache::new());
                (name.clone(), connector)
            })
            .collect();
        Self::with_connectors(config, connectors)
    }

    /// Backend over caller-supplied connectors.
    ///
    /// Routing covers every node in `config.nodes`; a node without a
    /// connector has no pool, so keys routed to it fail with `NoConnection`.
    pub fn with_connectors(
        config: &StorageConfig,
        connectors: BTreeMap<String, Arc<dyn CacheConnector>>,
    ) -> Result<Self, StorageError> {
        config.validate()?;
        let router = NodeRouter::new(config.nodes.keys().cloned(), config.ring_weight)?;
        let pools = connectors
            .into_iter()
            .map(|(name, connector)| Pool::new(name, CacheManager::new(connector), &config.pool))
            .collect();
        Ok(Self::new(router, pools, config.cache.max_store))
    }

    pub fn router(&self) -> &NodeRouter {
        &self.router
    }

    pub fn max_store(&self) -> usize {
        self.max_store
    }

    fn pool_for(&self, key: &str) -> Result<&Pool<CacheManager>, StorageError> {
        let node = self.router.resolve(key)?;
        match self.pools.get(node) {
            Some(pool) => {
                tracing::debug!("key {key:?} hit cache node {node:?}");
                Ok(pool)
            }
            None => {
                tracing::warn!("no cache pool for node {node:?} (key {key:?})");
                Err(StorageError::NoConnection {
                    node: node.to_string(),
                })
            }
        }
    }

    /// Pipeline `commands` to the node owning `key`.
    async fn run(&self, key: &str, commands: &[Command]) -> Result<Replies, StorageError> {
        let pool = self.pool_for(key)?;
        let mut conn = pool.acquire().await?;
        let result = conn.pipeline(commands).await;
        match result {
            Ok(replies) => Ok(replies),
            Err(e) => {
                conn.discard();
                Err(e.into())
            }
        }
    }

    /// Run a single command and return its reply.
    async fn run_one(&self, key: &str, command: Command) -> Result<Reply, StorageError> {
        let mut replies = self.run(key, std::slice::from_ref(&command)).await?;
        if replies.len() != 1 {
            return Err(CacheError::ReplyMismatch {
                expected: 1,
                got: replies.len(),
            }
            .into());
        }
        Ok(replies.remove(0)?)
    }

    /// Rank bound that keeps the `max_store` highest-scored members.
    /// Caps beyond the rank range keep everything.
    fn trim_stop(&self) -> i64 {
        i64::try_from(self.max_store).map_or(i64::MIN, |n| n.saturating_add(1).saturating_neg())
    }
}

#[async_trait]
impl MessageStorage for CacheBackend {
    async fn save(&self, key: &str, msg: &Message, mid: SequenceId) -> Result<(), StorageError> {
        let member = msg.encode()?;
        let commands = [
            Command::ZAdd {
                key: key.to_string(),
                score: mid,
                member,
            },
            Command::ZRemRangeByRank {
                key: key.to_string(),
                start: 0,
                stop: self.trim_stop(),
            },
        ];

        let replies = self.run(key, &commands).await?;
        BatchOutcome::from_replies(&commands, replies)?
            .into_result()
            .inspect_err(|e| tracing::error!("cache save key {key:?} mid {mid} failed: {e}"))
    }

    async fn get(&self, key: &str, mid: SequenceId) -> Result<Vec<String>, StorageError> {
        let command = Command::ZRangeByScore {
            key: key.to_string(),
            min: mid,
        };
        let name = command.name();
        Ok(self.run_one(key, command).await?.into_members(name)?)
    }

    async fn del_multi(&self, request: &DeletionRequest) -> Result<(), StorageError> {
        if request.msgs.is_empty() {
            return Ok(());
        }

        let commands: Vec<Command> = request
            .msgs
            .iter()
            .map(|member| Command::ZRem {
                key: request.key.clone(),
                member: member.clone(),
            })
            .collect();

        let replies = self.run(&request.key, &commands).await?;
        BatchOutcome::from_replies(&commands, replies)?
            .into_result()
            .inspect_err(|e| tracing::error!("cache delete on key {:?} failed: {e}", request.key))
    }

    async fn del_key(&self, key: &str) -> Result<(), StorageError> {
        self.run_one(
            key,
            Command::Del {
                key: key.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    async fn del_all_expired(&self) -> Result<SweepReport, StorageError> {
        tracing::debug!("cache backend evicts by size; nothing to sweep");
        Ok(SweepReport::default())
    }
}
