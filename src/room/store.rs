use anyhow::Result;
use async_trait::async_trait;

use crate::queue::UserId;
use crate::room::model::{MatchRoom, PlayerRole, RoomStatus};
use crate::sandbox::harness::Language;

/// Keyspace shared with any external-store implementation.
pub fn room_key(match_id: &str) -> String {
    format!("match_room:{match_id}")
}

/// Result of a code submission against the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Code stored under the resolved role; `both_ready` reports whether
    /// the opposing slot is also filled after this write.
    Stored {
        role: PlayerRole,
        both_ready: bool,
    },
    /// No live room for this match id.
    RoomMissing,
    /// The user is not one of the two registered players.
    UnknownPlayer,
    /// The room has already started running; submissions are rejected.
    Locked,
}

/// Store of live match rooms.
///
/// All mutation for one match id is serialized at the store, which is what
/// makes `try_claim_run` a safe exactly-once gate. Rooms with different
/// match ids proceed fully independently.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Registers a new room. Fails if a live room already exists for the
    /// same match id.
    async fn create(&self, room: MatchRoom) -> Result<()>;

    async fn get(&self, match_id: &str) -> Result<Option<MatchRoom>>;

    /// Stores code + language under the role resolved from `user_id`.
    /// Resubmission before the run starts overwrites the previous value.
    async fn submit_code(
        &self,
        match_id: &str,
        user_id: UserId,
        code: String,
        language: Language,
    ) -> Result<SubmitOutcome>;

    /// Atomic WAITING_SUBMISSIONS -> RUNNING transition, permitted only
    /// once both codes are present. Exactly one of any number of
    /// concurrent callers gets `true`; execution must start for that
    /// caller only.
    async fn try_claim_run(&self, match_id: &str) -> Result<bool>;

    /// Atomically removes the room and returns it with `final_status`
    /// applied. Returns `None` if no live room exists; the caller that
    /// receives `Some` owns completion; everyone else must do nothing.
    async fn take(&self, match_id: &str, final_status: RoomStatus) -> Result<Option<MatchRoom>>;
}
