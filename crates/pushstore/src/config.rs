//! Storage configuration.
//!
//! Loaded from TOML at startup, or assembled with the builder methods:
//!
//! ```rust
//! use std::time::Duration;
//! use pushstore::StorageConfig;
//!
//! let config = StorageConfig::durable([("node1", "/var/lib/pushstore/node1.db")])
//!     .sweep_interval(Duration::from_secs(600));
//! assert!(config.validate().is_ok());
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::pool::PoolConfig;
use crate::router::DEFAULT_RING_WEIGHT;

/// Which backend serves requests. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite, one row per message, periodic expiry sweep.
    Durable,
    /// In-memory sorted sets, size-capped per key.
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableConfig {
    /// Delay between expiry sweeps.
    pub sweep_interval_secs: u64,
    /// How long a statement waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 3600,
            busy_timeout_ms: 5000,
        }
    }
}

impl DurableConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Members kept per key; the lowest sequence ids are evicted first.
    pub max_store: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_store: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Virtual points per node on the hash ring.
    #[serde(default = "default_ring_weight")]
    pub ring_weight: u16,
    /// Node name → address (database path for durable, label for cache).
    pub nodes: BTreeMap<String, String>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub durable: DurableConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_ring_weight() -> u16 {
    DEFAULT_RING_WEIGHT
}

impl StorageConfig {
    fn with_nodes<I, K, V>(backend: BackendKind, nodes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            backend,
            ring_weight: DEFAULT_RING_WEIGHT,
            nodes: nodes
                .into_iter()
                .map(|(name, addr)| (name.into(), addr.into()))
                .collect(),
            pool: PoolConfig::default(),
            durable: DurableConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Durable backend over `(name, database path)` pairs.
    pub fn durable<I, K, V>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_nodes(BackendKind::Durable, nodes)
    }

    /// Cache backend over `(name, label)` pairs.
    pub fn cache<I, K, V>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_nodes(BackendKind::Cache, nodes)
    }

    pub fn ring_weight(mut self, weight: u16) -> Self {
        self.ring_weight = weight;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Per-key member cap for the cache backend (default: 20).
    pub fn max_store(mut self, max_store: usize) -> Self {
        self.cache.max_store = max_store;
        self
    }

    /// Delay between durable expiry sweeps (default: 1 hour).
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.durable.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, StorageError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| StorageError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.nodes.is_empty() {
            return Err(StorageError::Config("no storage nodes configured".into()));
        }
        if let Some((name, _)) = self.nodes.iter().find(|(_, addr)| addr.trim().is_empty()) {
            return Err(StorageError::Config(format!("node {name} has an empty address")));
        }
        match self.backend {
            BackendKind::Durable if self.durable.sweep_interval_secs == 0 => Err(
                StorageError::Config("durable.sweep_interval_secs must be positive".into()),
            ),
            BackendKind::Cache if self.cache.max_store == 0 => {
                Err(StorageError::Config("cache.max_store must be positive".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_durable_with_defaults() {
        let config = StorageConfig::from_toml_str(
            r#"
            backend = "durable"

            [nodes]
            node1 = "/data/node1.db"
            node2 = "/data/node2.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Durable);
        assert_eq!(config.ring_weight, 255);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.durable.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(config.cache.max_store, 20);
    }

    #[test]
    fn parse_every_field() {
        let config = StorageConfig::from_toml_str(
            r#"
            backend = "cache"
            ring_weight = 64

            [nodes]
            node1 = "cache-a"

            [pool]
            max_idle = 2
            max_active = 0
            idle_timeout_secs = 0

            [durable]
            sweep_interval_secs = 30
            busy_timeout_ms = 250

            [cache]
            max_store = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Cache);
        assert_eq!(config.ring_weight, 64);
        assert_eq!(config.pool.max_idle, 2);
        assert_eq!(config.pool.max_active, 0);
        assert_eq!(config.pool.idle_timeout(), None);
        assert_eq!(config.durable.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.durable.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.cache.max_store, 5);
    }

    #[test]
    fn partial_pool_section_keeps_defaults() {
        let config = StorageConfig::from_toml_str(
            r#"
            backend = "durable"
            nodes = { node1 = "a.db" }
            pool = { max_idle = 3 }
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max_idle, 3);
        assert_eq!(config.pool.max_active, PoolConfig::default().max_active);
    }

    #[test]
    fn empty_nodes_rejected() {
        let err = StorageConfig::from_toml_str("backend = \"cache\"\nnodes = {}\n").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn empty_address_rejected() {
        let err = StorageConfig::durable([("node1", " ")]).validate().unwrap_err();
        assert!(err.to_string().contains("node1"));
    }

    #[test]
    fn zero_max_store_rejected() {
        let err = StorageConfig::cache([("node1", "a")])
            .max_store(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let err = StorageConfig::durable([("node1", "a.db")])
            .sweep_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn unknown_backend_is_parse_error() {
        let err = StorageConfig::from_toml_str("backend = \"mysql\"\n[nodes]\na = \"b\"\n")
            .unwrap_err();
        assert!(matches!(err, StorageError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = StorageConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, StorageError::ConfigRead { .. }));
    }
}
