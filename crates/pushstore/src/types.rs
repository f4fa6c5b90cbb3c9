use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Per-key ordering cursor assigned by the caller. Monotonic within a key.
pub type SequenceId = i64;

/// An offline message as stored for a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Application payload, never inspected by the storage tier.
    pub msg: serde_json::Value,
    /// Absolute expiry (Unix seconds).
    pub expire: i64,
}

impl Message {
    pub fn new(msg: serde_json::Value, expire: i64) -> Self {
        Self { msg, expire }
    }

    /// Message that expires `ttl_secs` from now.
    pub fn with_ttl(msg: serde_json::Value, ttl_secs: i64) -> Self {
        Self::new(msg, now_secs() + ttl_secs)
    }

    /// Serialize to the stored representation.
    pub fn encode(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a payload returned by `get`.
    pub fn decode(payload: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expire <= now
    }
}

/// Acknowledgement-driven cleanup for one key.
///
/// `msgs` holds encoded messages exactly as returned by `get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub key: String,
    pub msgs: Vec<String>,
}

impl DeletionRequest {
    pub fn new(key: impl Into<String>, msgs: Vec<String>) -> Self {
        Self {
            key: key.into(),
            msgs,
        }
    }
}

/// Result of one successful expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Nodes swept.
    pub nodes: usize,
    /// Rows removed across all nodes.
    pub removed: u64,
}

/// Current Unix time in seconds.
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
