/// MemoryCache: in-process cache node holding one sorted set per key.
///
/// Every connection dialed from the same `MemoryCache` sees the same
/// data. A pipeline is applied under one lock, in order.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::cache::command::{Command, Replies, Reply};
use crate::cache::connection::{CacheConnection, CacheConnector};
use crate::cache::sorted_set::SortedSet;
use crate::error::CacheError;

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    sets: Arc<Mutex<HashMap<String, SortedSet>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys holding at least one member.
    pub fn key_count(&self) -> usize {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Members stored under `key`.
    pub fn card(&self, key: &str) -> usize {
        self.sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, SortedSet::len)
    }

    fn apply(&self, commands: &[Command]) -> Replies {
        let mut sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
        commands
            .iter()
            .map(|command| {
                let reply = match command {
                    Command::ZAdd { key, score, member } => {
                        let added = sets
                            .entry(key.clone())
                            .or_default()
                            .add(*score, member.clone());
                        Reply::Integer(added as i64)
                    }
                    Command::ZRem { key, member } => {
                        let removed = sets.get_mut(key).is_some_and(|set| set.remove(member));
                        Reply::Integer(removed as i64)
                    }
                    Command::ZRemRangeByRank { key, start, stop } => {
                        let removed = sets
                            .get_mut(key)
                            .map_or(0, |set| set.remove_range_by_rank(*start, *stop));
                        Reply::Integer(removed as i64)
                    }
                    Command::ZRangeByScore { key, min } => Reply::Members(
                        sets.get(key).map(|set| set.range_above(*min)).unwrap_or_default(),
                    ),
                    Command::Del { key } => Reply::Integer(sets.remove(key).is_some() as i64),
                };

                // Empty sets do not exist.
                if sets.get(command.key()).is_some_and(SortedSet::is_empty) {
                    sets.remove(command.key());
                }
                Ok(reply)
            })
            .collect()
    }
}

#[async_trait]
impl CacheConnector for MemoryCache {
    async fn connect(&self) -> Result<Box<dyn CacheConnection>, CacheError> {
        Ok(Box::new(MemoryConnection {
            cache: self.clone(),
        }))
    }
}

struct MemoryConnection {
    cache: MemoryCache,
}

#[async_trait]
impl CacheConnection for MemoryConnection {
    async fn pipeline(&mut self, commands: &[Command]) -> Result<Replies, CacheError> {
        Ok(self.cache.apply(commands))
    }
}
