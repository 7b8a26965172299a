use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use tracing::{Span, debug, error, field, info, instrument, warn};
use uuid::Uuid;

use crate::matchmaker::map_gen::MapGenerator;
use crate::metrics::counters::Counters;
use crate::notify::{Notifier, ServerEvent};
use crate::queue::{OrderedQueueStore, QueueTicket};
use crate::room::model::{GameMap, MatchRoom, PlayerRole, RoomStatus};
use crate::room::store::RoomStore;
use crate::session::registry::SessionRegistry;

/// Outcome of one matchmaking tick.
///
/// Failure branches carry their compensation with them: whenever a tick
/// does not end in `Matched`, every ticket it popped has already been
/// requeued at its original score. No ticket is ever dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A room was opened and both players notified.
    Matched { match_id: String },
    /// A pop raced with another consumer; the surviving ticket went back.
    Requeued,
    /// Fewer than two waiters; nothing to do.
    NoOp,
    /// Pairing failed after both pops (map generation or room opening);
    /// both tickets went back at their original scores.
    Failed,
}

pub struct Matcher {
    queues: Arc<dyn OrderedQueueStore>,
    rooms: Arc<dyn RoomStore>,
    registry: Arc<dyn SessionRegistry>,
    map_gen: Arc<dyn MapGenerator>,
    notifier: Arc<dyn Notifier>,
    map_attempts: u32,
    counters: Counters,
}

impl Matcher {
    pub fn new(
        queues: Arc<dyn OrderedQueueStore>,
        rooms: Arc<dyn RoomStore>,
        registry: Arc<dyn SessionRegistry>,
        map_gen: Arc<dyn MapGenerator>,
        notifier: Arc<dyn Notifier>,
        map_attempts: u32,
        counters: Counters,
    ) -> Self {
        Self {
            queues,
            rooms,
            registry,
            map_gen,
            notifier,
            map_attempts: map_attempts.max(1),
            counters,
        }
    }

    /// Executes one pairing tick for `game_type`.
    ///
    /// Flow:
    /// 1) Need at least two waiters.
    /// 2) Pop the two oldest tickets (FIFO). A short pop means another
    ///    consumer raced us: requeue what we got and abort.
    /// 3) Generate a playable map within the retry budget.
    /// 4) Open the room, index both players, notify each personally.
    /// Any failure after the pops rolls both tickets back at their
    /// original scores.
    #[instrument(
        skip(self),
        target = "matcher",
        fields(game_type = %game_type, match_id = field::Empty)
    )]
    pub async fn on_tick(&self, game_type: &str) -> Result<TickOutcome> {
        if self.queues.size(game_type).await? < 2 {
            self.counters.ticks_empty.fetch_add(1, Ordering::Relaxed);
            return Ok(TickOutcome::NoOp);
        }

        let first = self.queues.pop_oldest(game_type).await?;
        let second = self.queues.pop_oldest(game_type).await?;

        let (t1, t2) = match (first, second) {
            (Some(a), Some(b)) => (a, b),
            (survivor, None) | (None, survivor) => {
                // Another consumer drained the queue between size() and
                // the pops. Nothing is lost: the surviving ticket goes
                // straight back at its original score.
                self.counters.ticks_raced.fetch_add(1, Ordering::Relaxed);
                if let Some(t) = survivor {
                    self.queues.requeue(game_type, t.user_id, t.score).await?;
                }
                warn!("pop raced with a concurrent consumer; tick aborted");
                return Ok(TickOutcome::Requeued);
            }
        };

        let match_id = Uuid::new_v4().to_string();
        Span::current().record("match_id", field::display(&match_id));
        debug!(p1 = t1.user_id, p2 = t2.user_id, "pairing oldest waiters");

        let Some(map) = self.generate_playable_map(game_type).await else {
            error!("map generation exhausted its retry budget; rolling back");
            self.rollback(game_type, &t1, &t2).await?;
            return Ok(TickOutcome::Failed);
        };

        let room = MatchRoom::new(
            match_id.clone(),
            game_type.to_string(),
            map,
            t1.user_id,
            t2.user_id,
        );

        if let Err(e) = self.open_room(&room).await {
            error!(error = ?e, "failed to open match room; rolling back");
            // Retract the room if it got as far as the store, then
            // restore both tickets.
            let _ = self.rooms.take(&match_id, RoomStatus::Aborted).await;
            self.rollback(game_type, &t1, &t2).await?;
            return Ok(TickOutcome::Failed);
        }

        self.counters.matches_created.fetch_add(1, Ordering::Relaxed);
        info!(p1 = t1.user_id, p2 = t2.user_id, "match found");
        Ok(TickOutcome::Matched { match_id })
    }

    /// Bounded-retry map generation. A map counts only if it is playable
    /// (non-empty walls and coins).
    async fn generate_playable_map(&self, game_type: &str) -> Option<GameMap> {
        for attempt in 1..=self.map_attempts {
            match self.map_gen.generate(game_type).await {
                Ok(map) if map.is_playable() => return Some(map),
                Ok(_) => {
                    self.counters.mapgen_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(attempt, "generated map is not playable");
                }
                Err(e) => {
                    self.counters.mapgen_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(attempt, error = ?e, "map generation failed");
                }
            }
        }
        None
    }

    /// Creates the room, indexes both players, and sends each their
    /// personalized match-found notice (full map plus assigned role).
    async fn open_room(&self, room: &MatchRoom) -> Result<()> {
        self.rooms.create(room.clone()).await?;

        for slot in [&room.p1, &room.p2] {
            self.registry
                .bind_user_match(slot.user_id, &room.match_id)
                .await?;
        }

        for role in [PlayerRole::P1, PlayerRole::P2] {
            let recipient = room.slot(role).user_id;
            self.notifier
                .send_to_user(
                    recipient,
                    ServerEvent::MatchFound {
                        match_id: room.match_id.clone(),
                        p1_id: room.p1.user_id,
                        p2_id: room.p2.user_id,
                        map: room.map.clone(),
                        my_role: role,
                    },
                )
                .await?;
        }

        Ok(())
    }

    async fn rollback(&self, game_type: &str, t1: &QueueTicket, t2: &QueueTicket) -> Result<()> {
        self.queues.requeue(game_type, t1.user_id, t1.score).await?;
        self.queues.requeue(game_type, t2.user_id, t2.score).await?;
        Ok(())
    }
}
