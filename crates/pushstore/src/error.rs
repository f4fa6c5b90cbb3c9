/// Storage-level errors.
///
/// Routing and pool failures fail fast; backend failures are carried
/// verbatim so the caller can decide whether to retry.
use std::path::PathBuf;

use crate::cache::BatchOutcome;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The resolved node has no pool entry.
    #[error("no connection pool for node {node}")]
    NoConnection { node: String },

    /// The ring produced a node that is not configured.
    #[error("ring resolved unknown node {node}")]
    UnknownNode { node: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Some commands of a pipelined batch applied, others did not.
    #[error("{0}")]
    PartialBatch(BatchOutcome),

    #[error("message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Blocking(String),

    #[error("connection pool for node {node} is closed")]
    PoolClosed { node: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Errors raised by a cache node connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("connection to cache node lost")]
    Disconnected,

    #[error("{command} rejected: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },

    #[error("expected {expected} replies, got {got}")]
    ReplyMismatch { expected: usize, got: usize },
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Blocking(e.to_string())
    }
}
