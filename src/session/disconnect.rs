use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::metrics::counters::Counters;
use crate::publish::{MatchOutcome, ResultPublisher};
use crate::queue::OrderedQueueStore;
use crate::room::model::MatchResult;
use crate::room::store::RoomStore;
use crate::session::registry::SessionRegistry;

/// Converts a transport-level disconnect into a forfeiture.
///
/// The forfeiture travels the same publisher path as a normal result, and
/// the publisher's atomic room removal is what makes the
/// both-players-drop-at-once race deterministic: the first event forfeits
/// the opponent and deletes the room, the second finds no room and does
/// nothing.
pub struct DisconnectCoordinator {
    registry: Arc<dyn SessionRegistry>,
    queues: Arc<dyn OrderedQueueStore>,
    rooms: Arc<dyn RoomStore>,
    publisher: Arc<ResultPublisher>,
    game_types: Vec<String>,
    counters: Counters,
}

impl DisconnectCoordinator {
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        queues: Arc<dyn OrderedQueueStore>,
        rooms: Arc<dyn RoomStore>,
        publisher: Arc<ResultPublisher>,
        game_types: Vec<String>,
        counters: Counters,
    ) -> Self {
        Self {
            registry,
            queues,
            rooms,
            publisher,
            game_types,
            counters,
        }
    }

    #[instrument(skip(self), target = "session")]
    pub async fn on_disconnect(&self, session_id: &str) -> Result<()> {
        let Some(user_id) = self.registry.user_for_session(session_id).await? else {
            debug!("disconnect for unknown session; nothing to do");
            return Ok(());
        };

        info!(user_id, "connection lost");

        // A waiting player leaves the queue; failures here must not stop
        // the forfeiture path.
        for game_type in &self.game_types {
            if let Err(e) = self.queues.cancel(game_type, user_id).await {
                warn!(%game_type, error = ?e, "failed to cancel queue ticket");
            }
        }

        // Session->match is authoritative once the client joined its room;
        // user->match covers a drop between pairing and room join.
        let match_id = match self.registry.match_for_session(session_id).await? {
            Some(id) => Some(id),
            None => self.registry.match_for_user(user_id).await?,
        };

        let Some(match_id) = match_id else {
            self.registry.clear_session(session_id).await?;
            return Ok(());
        };

        let Some(room) = self.rooms.get(&match_id).await? else {
            // Opponent's disconnect (or the result) already completed it.
            debug!(%match_id, "no live room for disconnected user");
            self.registry.clear_session(session_id).await?;
            return Ok(());
        };

        let Some(role) = room.role_of(user_id) else {
            warn!(%match_id, user_id, "disconnected user not in mapped room");
            self.registry.clear_session(session_id).await?;
            return Ok(());
        };

        info!(%match_id, role = role.as_str(), "forfeiting match for disconnected player");
        self.counters.forfeits.fetch_add(1, Ordering::Relaxed);

        let forfeit = MatchResult::forfeit(role.other());
        let published = self
            .publisher
            .publish(&match_id, MatchOutcome::Finished(forfeit))
            .await?;

        if !published {
            debug!(%match_id, "match completed before forfeiture applied");
        }

        // The publisher clears per-user mappings; the disconnecting
        // session's own bindings go here (covers the not-published path).
        self.registry.clear_session(session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    use crate::archive::{MatchArchive, MatchRecord};
    use crate::notify::ServerEvent;
    use crate::notify::channel::ChannelNotifier;
    use crate::queue::memory::InMemoryQueueStore;
    use crate::room::memory::InMemoryRoomStore;
    use crate::room::model::{GameMap, MatchRoom, ResultReason, Winner};
    use crate::session::registry::InMemorySessionRegistry;

    struct NullArchive {
        saved: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl MatchArchive for NullArchive {
        async fn save(&self, _record: &MatchRecord) -> Result<()> {
            *self.saved.lock() += 1;
            Ok(())
        }
    }

    struct Fixture {
        queues: Arc<InMemoryQueueStore>,
        rooms: Arc<InMemoryRoomStore>,
        registry: Arc<InMemorySessionRegistry>,
        notifier: Arc<ChannelNotifier>,
        archive: Arc<NullArchive>,
        coordinator: DisconnectCoordinator,
    }

    fn mk_fixture() -> Fixture {
        let queues = Arc::new(InMemoryQueueStore::new());
        let rooms = Arc::new(InMemoryRoomStore::new());
        let registry = Arc::new(InMemorySessionRegistry::new());
        let notifier = Arc::new(ChannelNotifier::default());
        let archive = Arc::new(NullArchive {
            saved: Mutex::new(0),
        });

        let publisher = Arc::new(ResultPublisher::new(
            rooms.clone(),
            registry.clone(),
            notifier.clone(),
            archive.clone(),
            Counters::default(),
        ));

        let coordinator = DisconnectCoordinator::new(
            registry.clone(),
            queues.clone(),
            rooms.clone(),
            publisher,
            vec!["land_grab".to_string()],
            Counters::default(),
        );

        Fixture {
            queues,
            rooms,
            registry,
            notifier,
            archive,
            coordinator,
        }
    }

    fn mk_room() -> MatchRoom {
        MatchRoom::new("m1".into(), "land_grab".into(), GameMap::default(), 1, 2)
    }

    #[tokio::test]
    async fn unknown_session_is_a_noop() {
        let f = mk_fixture();
        f.coordinator.on_disconnect("ghost").await.unwrap();
        assert_eq!(*f.archive.saved.lock(), 0);
    }

    #[tokio::test]
    async fn waiting_player_is_removed_from_queue() {
        let f = mk_fixture();
        f.registry.bind_connection("s1", 1).await.unwrap();
        f.queues.enqueue("land_grab", 1).await.unwrap();

        f.coordinator.on_disconnect("s1").await.unwrap();

        assert_eq!(f.queues.size("land_grab").await.unwrap(), 0);
        assert_eq!(f.registry.user_for_session("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn disconnect_mid_match_forfeits_to_the_opponent() {
        let f = mk_fixture();
        f.rooms.create(mk_room()).await.unwrap();
        f.registry.bind_connection("s1", 1).await.unwrap();
        f.registry.bind_game("s1", "m1").await.unwrap();
        f.registry.bind_user_match(1, "m1").await.unwrap();
        f.registry.bind_user_match(2, "m1").await.unwrap();

        let mut rx = f.notifier.subscribe_match("m1");

        f.coordinator.on_disconnect("s1").await.unwrap();

        match rx.recv().await.unwrap() {
            ServerEvent::Result { result } => {
                assert_eq!(result.winner, Winner::P2);
                assert_eq!(result.reason, ResultReason::OpponentDisconnected);
                assert_eq!(result.final_scores.p1, 0);
                assert!(result.logs.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(f.rooms.get("m1").await.unwrap().is_none());
        assert_eq!(f.registry.match_for_user(2).await.unwrap(), None);
        assert_eq!(*f.archive.saved.lock(), 1);
    }

    #[tokio::test]
    async fn disconnect_before_room_join_still_forfeits() {
        let f = mk_fixture();
        f.rooms.create(mk_room()).await.unwrap();
        f.registry.bind_connection("s1", 1).await.unwrap();
        // No bind_game: the player dropped right after MATCH_FOUND.
        f.registry.bind_user_match(1, "m1").await.unwrap();

        f.coordinator.on_disconnect("s1").await.unwrap();

        assert!(f.rooms.get("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn simultaneous_disconnects_publish_exactly_once() {
        let f = mk_fixture();
        f.rooms.create(mk_room()).await.unwrap();
        for (sid, uid) in [("s1", 1), ("s2", 2)] {
            f.registry.bind_connection(sid, uid).await.unwrap();
            f.registry.bind_game(sid, "m1").await.unwrap();
            f.registry.bind_user_match(uid, "m1").await.unwrap();
        }

        let mut rx = f.notifier.subscribe_match("m1");

        f.coordinator.on_disconnect("s1").await.unwrap();
        f.coordinator.on_disconnect("s2").await.unwrap();

        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err(), "second disconnect must not publish");
        assert_eq!(*f.archive.saved.lock(), 1);
    }

    #[tokio::test]
    async fn disconnect_with_no_room_publishes_nothing() {
        let f = mk_fixture();
        f.registry.bind_connection("s1", 1).await.unwrap();
        f.registry.bind_game("s1", "m-gone").await.unwrap();

        let mut rx = f.notifier.subscribe_match("m-gone");

        f.coordinator.on_disconnect("s1").await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(*f.archive.saved.lock(), 0);
        assert_eq!(f.registry.match_for_session("s1").await.unwrap(), None);
    }
}
