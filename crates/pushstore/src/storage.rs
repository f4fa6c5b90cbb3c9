//! The storage contract shared by both backends, and the startup-time
//! facade that picks one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheBackend;
use crate::config::{BackendKind, StorageConfig};
use crate::durable::DurableBackend;
use crate::error::StorageError;
use crate::sweeper::{Sweeper, SweeperHandle};
use crate::types::{DeletionRequest, Message, SequenceId, SweepReport};

/// Offline message queue per key.
///
/// Operations never retry internally; every failure goes straight back
/// to the caller. Implementations must be `Send + Sync` so one instance
/// can serve concurrent requests.
#[async_trait]
pub trait MessageStorage: Send + Sync {
    /// Store `msg` under `key` with sequence id `mid`.
    async fn save(&self, key: &str, msg: &Message, mid: SequenceId) -> Result<(), StorageError>;

    /// Encoded messages for `key` with a sequence id above `mid`.
    async fn get(&self, key: &str, mid: SequenceId) -> Result<Vec<String>, StorageError>;

    /// Remove delivered messages. May be deferred by the backend.
    async fn del_multi(&self, request: &DeletionRequest) -> Result<(), StorageError>;

    /// Remove every message for `key`. May be deferred by the backend.
    async fn del_key(&self, key: &str) -> Result<(), StorageError>;

    /// Reclaim expired messages on every node.
    async fn del_all_expired(&self) -> Result<SweepReport, StorageError>;
}

/// Open the backend named by `config.backend`.
pub async fn open_backend(config: &StorageConfig) -> Result<Arc<dyn MessageStorage>, StorageError> {
    config.validate()?;
    let storage: Arc<dyn MessageStorage> = match config.backend {
        BackendKind::Durable => Arc::new(DurableBackend::open(config).await?),
        BackendKind::Cache => Arc::new(CacheBackend::open(config)?),
    };
    tracing::info!(
        "opened {:?} storage over {} node(s)",
        config.backend,
        config.nodes.len()
    );
    Ok(storage)
}

/// A configured backend plus, for the durable backend, its expiry sweeper.
pub struct OfflineStorage {
    kind: BackendKind,
    storage: Arc<dyn MessageStorage>,
    sweeper: Option<SweeperHandle>,
}

impl OfflineStorage {
    /// Open the configured backend and start its sweeper if it has one.
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let storage = open_backend(config).await?;
        let sweeper = match config.backend {
            BackendKind::Durable => Some(Sweeper::spawn(
                Arc::clone(&storage),
                config.durable.sweep_interval(),
            )),
            // Cache expiry is size-based, enforced on every save.
            BackendKind::Cache => None,
        };
        Ok(Self {
            kind: config.backend,
            storage,
            sweeper,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Shared handle for request traffic.
    pub fn storage(&self) -> Arc<dyn MessageStorage> {
        Arc::clone(&self.storage)
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        if let Some(sweeper) = self.sweeper {
            sweeper.shutdown().await;
        }
    }
}
