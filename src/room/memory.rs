use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::queue::UserId;
use crate::room::model::{MatchRoom, RoomStatus};
use crate::room::store::{RoomStore, SubmitOutcome, room_key};
use crate::sandbox::harness::Language;

/// Process-local room store.
///
/// One lock guards the whole table, so every trait operation is atomic;
/// in particular `try_claim_run` observes "both submitted" and flips the
/// status in the same critical section, and `take` removes the room in
/// one step.
#[derive(Default)]
pub struct InMemoryRoomStore {
    rooms: Mutex<HashMap<String, MatchRoom>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_rooms(&self) -> usize {
        self.rooms.lock().len()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    #[instrument(skip(self, room), target = "room", fields(match_id = %room.match_id))]
    async fn create(&self, room: MatchRoom) -> Result<()> {
        let mut rooms = self.rooms.lock();
        let key = room_key(&room.match_id);

        if rooms.contains_key(&key) {
            anyhow::bail!("room already exists for match {}", room.match_id);
        }

        info!(game_type = %room.game_type, "match room created");
        rooms.insert(key, room);
        Ok(())
    }

    async fn get(&self, match_id: &str) -> Result<Option<MatchRoom>> {
        Ok(self.rooms.lock().get(&room_key(match_id)).cloned())
    }

    #[instrument(skip(self, code), target = "room")]
    async fn submit_code(
        &self,
        match_id: &str,
        user_id: UserId,
        code: String,
        language: Language,
    ) -> Result<SubmitOutcome> {
        let mut rooms = self.rooms.lock();

        let Some(room) = rooms.get_mut(&room_key(match_id)) else {
            warn!("submission for non-existent or expired match");
            return Ok(SubmitOutcome::RoomMissing);
        };

        if room.status != RoomStatus::WaitingSubmissions {
            warn!(status = ?room.status, "submission rejected; room is locked pending result");
            return Ok(SubmitOutcome::Locked);
        }

        let Some(role) = room.role_of(user_id) else {
            warn!(user_id, "unknown user tried to submit; dropping");
            return Ok(SubmitOutcome::UnknownPlayer);
        };

        let slot = room.slot_mut(role);
        let resubmission = slot.submitted();
        slot.code = Some(code);
        slot.language = Some(language);

        info!(role = role.as_str(), resubmission, "code saved");
        Ok(SubmitOutcome::Stored {
            role,
            both_ready: room.both_submitted(),
        })
    }

    #[instrument(skip(self), target = "room")]
    async fn try_claim_run(&self, match_id: &str) -> Result<bool> {
        let mut rooms = self.rooms.lock();

        let Some(room) = rooms.get_mut(&room_key(match_id)) else {
            return Ok(false);
        };

        if room.status != RoomStatus::WaitingSubmissions || !room.both_submitted() {
            return Ok(false);
        }

        room.status = RoomStatus::Running;
        info!("run claimed; room locked");
        Ok(true)
    }

    #[instrument(skip(self), target = "room")]
    async fn take(&self, match_id: &str, final_status: RoomStatus) -> Result<Option<MatchRoom>> {
        let mut rooms = self.rooms.lock();

        match rooms.remove(&room_key(match_id)) {
            Some(mut room) => {
                room.status = final_status;
                info!(status = ?final_status, "match room removed");
                Ok(Some(room))
            }
            None => {
                debug!("no live room to remove");
                Ok(None)
            }
        }
    }
}
