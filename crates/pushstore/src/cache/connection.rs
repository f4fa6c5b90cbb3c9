/// Connection seams for cache nodes.
///
/// A [`CacheConnector`] dials one node; a [`CacheConnection`] sends a
/// pipeline of commands in a single round trip. [`CacheManager`] adapts a
/// connector to the per-node [`Pool`](crate::pool::Pool).
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::command::{Command, Replies};
use crate::error::{CacheError, StorageError};
use crate::pool::Manager;

#[async_trait]
pub trait CacheConnection: Send {
    /// Send all `commands`, then read one reply per command.
    ///
    /// The outer error means the round trip itself failed and the
    /// connection should not be reused.
    async fn pipeline(&mut self, commands: &[Command]) -> Result<Replies, CacheError>;
}

#[async_trait]
pub trait CacheConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn CacheConnection>, CacheError>;
}

/// Pool manager for one cache node.
pub struct CacheManager {
    connector: Arc<dyn CacheConnector>,
}

impl CacheManager {
    pub fn new(connector: Arc<dyn CacheConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Manager for CacheManager {
    type Connection = Box<dyn CacheConnection>;

    async fn connect(&self) -> Result<Self::Connection, StorageError> {
        Ok(self.connector.connect().await?)
    }
}
