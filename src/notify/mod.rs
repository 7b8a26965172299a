//! Real-time push payloads and the delivery seam.
//!
//! One topic per user (match-found delivery) and one per match (room
//! events). Payloads carry a `type` discriminator so clients can dispatch
//! without peeking at the body. The transport itself (websocket/STOMP/...)
//! is wired externally against the `Notifier` trait.

pub mod channel;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::queue::UserId;
use crate::room::model::{GameMap, MatchResult, PlayerRole};

pub use channel::ChannelNotifier;

/// Message broadcast when a player submits: role only, never the code.
pub const PLAYER_SUBMITTED: &str = "PLAYER_SUBMITTED";

pub fn user_topic(user_id: UserId) -> String {
    format!("match/{user_id}")
}

pub fn match_topic(match_id: &str) -> String {
    format!("game/{match_id}")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// Personalized pairing notice: full map plus the recipient's role.
    MatchFound {
        match_id: String,
        p1_id: UserId,
        p2_id: UserId,
        map: GameMap,
        my_role: PlayerRole,
    },
    /// Lightweight room event (e.g. opponent submitted).
    Notification { message: String, role: PlayerRole },
    /// Final outcome, normal or forfeited.
    Result {
        #[serde(flatten)]
        result: MatchResult,
    },
    /// Match ended without a result (judge failure).
    Error { error: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> Result<()>;
    async fn send_to_match(&self, match_id: &str, event: ServerEvent) -> Result<()>;
}
