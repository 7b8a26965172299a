//! Ordered waiting queues for matchmaking.
//!
//! One queue per game type, keyed `match_queue:{game_type}`. Entries are
//! unique per user and ordered by enqueue time (oldest first). All store
//! operations are atomic at the store: multiple matcher instances may race
//! on the same queue without losing or duplicating tickets.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Player identity, as issued by the (external) auth layer.
pub type UserId = i64;

/// A waiting entry popped from the queue. `score` is the original enqueue
/// time in epoch millis; it is carried so a failed pairing can requeue the
/// player at their original position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueTicket {
    pub user_id: UserId,
    pub score: u64,
}

/// Keyspace shared with any external-store implementation.
pub fn queue_key(game_type: &str) -> String {
    format!("match_queue:{game_type}")
}

#[async_trait]
pub trait OrderedQueueStore: Send + Sync {
    /// Adds the user to the queue with score = current time.
    ///
    /// Idempotent: a user already waiting keeps their original score, and
    /// `false` is returned.
    async fn enqueue(&self, game_type: &str, user_id: UserId) -> Result<bool>;

    /// Unconditional removal; no-op if the user is not queued.
    async fn cancel(&self, game_type: &str, user_id: UserId) -> Result<()>;

    /// Number of distinct users currently waiting.
    async fn size(&self, game_type: &str) -> Result<usize>;

    /// Atomically removes and returns the oldest entry.
    ///
    /// Concurrent callers never receive the same ticket twice and never
    /// remove more tickets than existed.
    async fn pop_oldest(&self, game_type: &str) -> Result<Option<QueueTicket>>;

    /// Reinserts a ticket at an explicit score, restoring its original
    /// queue position. Used for rollback after a failed pairing.
    async fn requeue(&self, game_type: &str, user_id: UserId, score: u64) -> Result<()>;
}
