/// Commands understood by a cache node, their replies, and the outcome of
/// a pipelined batch.
///
/// A pipeline is not a transaction: each command applies or fails on its
/// own, and nothing is rolled back.
use std::fmt;

use crate::error::{CacheError, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add `member` with `score`, or move it to `score`.
    ZAdd {
        key: String,
        score: i64,
        member: String,
    },
    ZRem {
        key: String,
        member: String,
    },
    /// Remove members ranked `start..=stop` (negative ranks count from the top).
    ZRemRangeByRank { key: String, start: i64, stop: i64 },
    /// Members scored strictly above `min`, unbounded above.
    ZRangeByScore { key: String, min: i64 },
    Del { key: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZRemRangeByRank { .. } => "ZREMRANGEBYRANK",
            Command::ZRangeByScore { .. } => "ZRANGEBYSCORE",
            Command::Del { .. } => "DEL",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Command::ZAdd { key, .. }
            | Command::ZRem { key, .. }
            | Command::ZRemRangeByRank { key, .. }
            | Command::ZRangeByScore { key, .. }
            | Command::Del { key } => key.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Integer(i64),
    Members(Vec<String>),
}

impl Reply {
    pub fn into_members(self, command: &'static str) -> Result<Vec<String>, CacheError> {
        match self {
            Reply::Members(members) => Ok(members),
            Reply::Integer(n) => Err(CacheError::Rejected {
                command,
                reason: format!("expected member list, got integer {n}"),
            }),
        }
    }
}

/// Per-command replies of one pipeline, in command order.
pub type Replies = Vec<Result<Reply, CacheError>>;

// ── Batch outcome ─────────────────────────────────────────────────────

/// One failed command within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// Position in the pipeline.
    pub index: usize,
    pub command: &'static str,
    pub error: CacheError,
}

/// Which commands of a pipeline applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total: usize,
    pub failures: Vec<CommandFailure>,
}

impl BatchOutcome {
    /// Fold pipeline replies. Errors if the node answered a different
    /// number of commands than were sent.
    pub fn from_replies(commands: &[Command], replies: Replies) -> Result<Self, CacheError> {
        if replies.len() != commands.len() {
            return Err(CacheError::ReplyMismatch {
                expected: commands.len(),
                got: replies.len(),
            });
        }

        let failures = commands
            .iter()
            .zip(replies)
            .enumerate()
            .filter_map(|(index, (command, reply))| {
                reply.err().map(|error| CommandFailure {
                    index,
                    command: command.name(),
                    error,
                })
            })
            .collect();

        Ok(Self {
            total: commands.len(),
            failures,
        })
    }

    /// Commands that applied.
    pub fn applied(&self) -> usize {
        self.total - self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok` when every command applied, the first error when none did,
    /// and `PartialBatch` otherwise.
    pub fn into_result(self) -> Result<(), StorageError> {
        if self.is_complete() {
            return Ok(());
        }
        if self.applied() == 0 {
            let first = self.failures.into_iter().next().map(|f| f.error);
            return Err(first.unwrap_or(CacheError::Disconnected).into());
        }
        Err(StorageError::PartialBatch(self))
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch partially applied: {}/{} commands succeeded",
            self.applied(),
            self.total
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, "; {} #{} failed: {}", first.command, first.index, first.error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Vec<Command> {
        vec![
            Command::ZAdd {
                key: "k".into(),
                score: 1,
                member: "m".into(),
            },
            Command::ZRemRangeByRank {
                key: "k".into(),
                start: 0,
                stop: -21,
            },
        ]
    }

    fn rejected(command: &'static str) -> CacheError {
        CacheError::Rejected {
            command,
            reason: "boom".into(),
        }
    }

    #[test]
    fn complete_batch_is_ok() {
        let outcome =
            BatchOutcome::from_replies(&pair(), vec![Ok(Reply::Integer(1)), Ok(Reply::Integer(0))])
                .unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.applied(), 2);
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn partial_batch_reports_applied_count() {
        let outcome = BatchOutcome::from_replies(
            &pair(),
            vec![Ok(Reply::Integer(1)), Err(rejected("ZREMRANGEBYRANK"))],
        )
        .unwrap();
        assert_eq!(outcome.applied(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].command, "ZREMRANGEBYRANK");

        let err = outcome.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "batch partially applied: 1/2 commands succeeded; ZREMRANGEBYRANK #1 failed: ZREMRANGEBYRANK rejected: boom"
        );
        assert!(matches!(err, StorageError::PartialBatch(_)));
    }

    #[test]
    fn total_failure_surfaces_first_error() {
        let outcome = BatchOutcome::from_replies(
            &pair(),
            vec![Err(rejected("ZADD")), Err(rejected("ZREMRANGEBYRANK"))],
        )
        .unwrap();
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(
            err,
            StorageError::Cache(CacheError::Rejected { command: "ZADD", .. })
        ));
    }

    #[test]
    fn reply_count_mismatch() {
        let err = BatchOutcome::from_replies(&pair(), vec![Ok(Reply::Integer(1))]).unwrap_err();
        assert_eq!(
            err,
            CacheError::ReplyMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn integer_reply_is_not_a_member_list() {
        let err = Reply::Integer(3).into_members("ZRANGEBYSCORE").unwrap_err();
        assert!(matches!(err, CacheError::Rejected { command: "ZRANGEBYSCORE", .. }));
    }

    #[test]
    fn command_metadata() {
        let del = Command::Del { key: "user-9".into() };
        assert_eq!(del.name(), "DEL");
        assert_eq!(del.key(), "user-9");
    }
}
