use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::queue::{OrderedQueueStore, QueueTicket, UserId, queue_key};
use crate::time::now_ms;

/// Process-local queue store.
///
/// Guarantees:
/// - All operations take one lock over the whole keyspace, so pop-min is
///   atomic with respect to concurrent pops, enqueues and cancels.
/// - Ties on score break by user id, so pop order is total and two entries
///   enqueued in the same millisecond still pop deterministically.
///
/// A multi-instance deployment swaps this for an external ordered store
/// behind the same trait; the key layout already matches.
#[derive(Default)]
pub struct InMemoryQueueStore {
    queues: Mutex<HashMap<String, Shard>>,
}

#[derive(Default)]
struct Shard {
    /// (score, user_id), ordered oldest-first.
    ordered: BTreeSet<(u64, UserId)>,
    /// user_id -> score, for idempotency and O(log n) cancel.
    index: HashMap<UserId, u64>,
}

impl Shard {
    fn insert(&mut self, user_id: UserId, score: u64) {
        if let Some(prev) = self.index.insert(user_id, score) {
            self.ordered.remove(&(prev, user_id));
        }
        self.ordered.insert((score, user_id));
    }

    fn remove(&mut self, user_id: UserId) -> bool {
        match self.index.remove(&user_id) {
            Some(score) => self.ordered.remove(&(score, user_id)),
            None => false,
        }
    }
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderedQueueStore for InMemoryQueueStore {
    #[instrument(skip(self), target = "queue")]
    async fn enqueue(&self, game_type: &str, user_id: UserId) -> Result<bool> {
        let mut queues = self.queues.lock();
        let shard = queues.entry(queue_key(game_type)).or_default();

        if shard.index.contains_key(&user_id) {
            debug!("user already in queue; keeping original position");
            return Ok(false);
        }

        shard.insert(user_id, now_ms());
        info!(waiting = shard.index.len(), "user joined queue");
        Ok(true)
    }

    #[instrument(skip(self), target = "queue")]
    async fn cancel(&self, game_type: &str, user_id: UserId) -> Result<()> {
        let mut queues = self.queues.lock();
        if let Some(shard) = queues.get_mut(&queue_key(game_type)) {
            if shard.remove(user_id) {
                info!("user cancelled queue");
            }
        }
        Ok(())
    }

    async fn size(&self, game_type: &str) -> Result<usize> {
        let queues = self.queues.lock();
        Ok(queues
            .get(&queue_key(game_type))
            .map_or(0, |s| s.index.len()))
    }

    #[instrument(skip(self), target = "queue")]
    async fn pop_oldest(&self, game_type: &str) -> Result<Option<QueueTicket>> {
        let mut queues = self.queues.lock();
        let Some(shard) = queues.get_mut(&queue_key(game_type)) else {
            return Ok(None);
        };

        let Some(&(score, user_id)) = shard.ordered.iter().next() else {
            return Ok(None);
        };

        shard.ordered.remove(&(score, user_id));
        shard.index.remove(&user_id);

        debug!(user_id, score, "popped oldest waiter");
        Ok(Some(QueueTicket { user_id, score }))
    }

    #[instrument(skip(self), target = "queue")]
    async fn requeue(&self, game_type: &str, user_id: UserId, score: u64) -> Result<()> {
        let mut queues = self.queues.lock();
        let shard = queues.entry(queue_key(game_type)).or_default();

        shard.insert(user_id, score);
        info!(score, "user returned to queue at original position");
        Ok(())
    }
}
