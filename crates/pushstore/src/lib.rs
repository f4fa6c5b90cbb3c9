//! Offline message storage for a pub/sub cluster.
//!
//! Messages for subscribers that are not connected are sharded across
//! storage nodes by key and read back, in sequence order, once the
//! subscriber returns.
//!
//! Backends: durable (SQLite, one row per message, periodic expiry
//! sweep) and cache (per-key sorted sets, capped by size).

pub mod cache;
pub mod config;
pub mod durable;
pub mod error;
pub mod pool;
pub mod ring;
pub mod router;
pub mod storage;
pub mod sweeper;
pub mod types;

pub use cache::{
    BatchOutcome, CacheBackend, CacheConnection, CacheConnector, CacheManager, Command,
    CommandFailure, MemoryCache, Replies, Reply, SortedSet,
};
pub use config::{BackendKind, CacheConfig, DurableConfig, StorageConfig};
pub use durable::{DurableBackend, SqliteManager};
pub use error::{CacheError, StorageError};
pub use pool::{Manager, Pool, PoolConfig, PoolSet, Pooled};
pub use ring::{HashRing, Ketama};
pub use router::{NodeRouter, DEFAULT_RING_WEIGHT};
pub use storage::{open_backend, MessageStorage, OfflineStorage};
pub use sweeper::{Sweeper, SweeperHandle};
pub use types::{now_secs, DeletionRequest, Message, SequenceId, SweepReport};
