/// Cache backend: per-key sorted sets on in-memory nodes.
///
/// Four layers:
/// - **SortedSet**: the per-key structure (score = sequence id)
/// - **Command**: pipelined wire commands, replies, batch outcomes
/// - **Connection**: connector/connection seams and the pool manager
/// - **Backend**: the `MessageStorage` implementation
pub mod backend;
pub mod command;
pub mod connection;
pub mod memory;
pub mod sorted_set;

pub use backend::CacheBackend;
pub use command::{BatchOutcome, Command, CommandFailure, Replies, Reply};
pub use connection::{CacheConnection, CacheConnector, CacheManager};
pub use memory::MemoryCache;
pub use sorted_set::SortedSet;
