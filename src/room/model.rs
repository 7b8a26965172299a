use serde::{Deserialize, Serialize};

use crate::queue::UserId;
use crate::sandbox::harness::Language;

/// Map blob produced by the judge `init` phase.
///
/// `walls` and `coins` are the only fields the orchestration layer looks
/// at (a playable map needs both non-empty); everything else the judge
/// emits is carried through opaquely for the clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMap {
    pub walls: Vec<[u16; 2]>,
    pub coins: Vec<[u16; 2]>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GameMap {
    pub fn is_playable(&self) -> bool {
        !self.walls.is_empty() && !self.coins.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    P1,
    P2,
}

impl PlayerRole {
    pub fn other(self) -> PlayerRole {
        match self {
            PlayerRole::P1 => PlayerRole::P2,
            PlayerRole::P2 => PlayerRole::P1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerRole::P1 => "p1",
            PlayerRole::P2 => "p2",
        }
    }
}

/// Room lifecycle. Transitions are forward-only:
/// WaitingSubmissions -> Running -> Finished | Aborted -> (deleted).
/// A deleted room is never reopened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomStatus {
    WaitingSubmissions,
    Running,
    Finished,
    Aborted,
}

#[derive(Clone, Debug)]
pub struct PlayerSlot {
    pub user_id: UserId,
    pub code: Option<String>,
    pub language: Option<Language>,
}

impl PlayerSlot {
    fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            code: None,
            language: None,
        }
    }

    pub fn submitted(&self) -> bool {
        self.code.is_some()
    }
}

/// Live coordination record for one in-progress match.
#[derive(Clone, Debug)]
pub struct MatchRoom {
    pub match_id: String,
    pub game_type: String,
    pub map: GameMap,
    pub p1: PlayerSlot,
    pub p2: PlayerSlot,
    pub status: RoomStatus,
}

impl MatchRoom {
    pub fn new(
        match_id: String,
        game_type: String,
        map: GameMap,
        p1_id: UserId,
        p2_id: UserId,
    ) -> Self {
        Self {
            match_id,
            game_type,
            map,
            p1: PlayerSlot::empty(p1_id),
            p2: PlayerSlot::empty(p2_id),
            status: RoomStatus::WaitingSubmissions,
        }
    }

    pub fn role_of(&self, user_id: UserId) -> Option<PlayerRole> {
        if self.p1.user_id == user_id {
            Some(PlayerRole::P1)
        } else if self.p2.user_id == user_id {
            Some(PlayerRole::P2)
        } else {
            None
        }
    }

    pub fn slot(&self, role: PlayerRole) -> &PlayerSlot {
        match role {
            PlayerRole::P1 => &self.p1,
            PlayerRole::P2 => &self.p2,
        }
    }

    pub fn slot_mut(&mut self, role: PlayerRole) -> &mut PlayerSlot {
        match role {
            PlayerRole::P1 => &mut self.p1,
            PlayerRole::P2 => &mut self.p2,
        }
    }

    pub fn both_submitted(&self) -> bool {
        self.p1.submitted() && self.p2.submitted()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    P1,
    P2,
    Draw,
}

impl Winner {
    pub fn as_str(self) -> &'static str {
        match self {
            Winner::P1 => "p1",
            Winner::P2 => "p2",
            Winner::Draw => "draw",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBoard {
    pub p1: i64,
    pub p2: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultReason {
    Completed,
    OpponentDisconnected,
}

impl Default for ResultReason {
    fn default() -> Self {
        ResultReason::Completed
    }
}

impl ResultReason {
    /// Wire/storage form, matching the serialized representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ResultReason::Completed => "COMPLETED",
            ResultReason::OpponentDisconnected => "OPPONENT_DISCONNECTED",
        }
    }
}

/// Final outcome of a match.
///
/// Produced either by the judge (normal finish) or synthesized on
/// disconnect; downstream consumers cannot tell the two apart
/// structurally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: Winner,
    #[serde(default)]
    pub reason: ResultReason,
    pub final_scores: ScoreBoard,
    #[serde(default)]
    pub total_turns: Option<u64>,
    #[serde(default)]
    pub logs: Option<serde_json::Value>,
    #[serde(default)]
    pub p1_error: Option<String>,
    #[serde(default)]
    pub p2_error: Option<String>,
}

impl MatchResult {
    /// Forfeiture assigned to a disconnected participant: the remaining
    /// player wins, scores are zeroed, no logs are attached.
    pub fn forfeit(winner: PlayerRole) -> Self {
        Self {
            winner: match winner {
                PlayerRole::P1 => Winner::P1,
                PlayerRole::P2 => Winner::P2,
            },
            reason: ResultReason::OpponentDisconnected,
            final_scores: ScoreBoard::default(),
            total_turns: None,
            logs: None,
            p1_error: None,
            p2_error: None,
        }
    }
}
