//! Durable storage hand-off for finished matches.
//!
//! The archive is a downstream collaborator: a save failure is logged and
//! never blocks result delivery to clients. History/read access lives
//! elsewhere.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::AnyPool;

use crate::queue::UserId;
use crate::room::model::{MatchResult, MatchRoom, Winner};
use crate::time::now_ms;

/// Flattened record handed to durable storage: the outcome plus the
/// identities and submissions that produced it. Code fields are absent
/// when a player forfeited before submitting.
#[derive(Clone, Debug)]
pub struct MatchRecord {
    pub match_id: String,
    pub game_type: String,
    pub p1_id: UserId,
    pub p2_id: UserId,
    pub winner: Winner,
    pub reason: String,
    pub p1_score: i64,
    pub p2_score: i64,
    pub p1_code: Option<String>,
    pub p1_lang: Option<String>,
    pub p2_code: Option<String>,
    pub p2_lang: Option<String>,
    pub finished_ms: u64,
}

impl MatchRecord {
    pub fn from_room(room: &MatchRoom, result: &MatchResult) -> Self {
        Self {
            match_id: room.match_id.clone(),
            game_type: room.game_type.clone(),
            p1_id: room.p1.user_id,
            p2_id: room.p2.user_id,
            winner: result.winner,
            reason: result.reason.as_str().to_string(),
            p1_score: result.final_scores.p1,
            p2_score: result.final_scores.p2,
            p1_code: room.p1.code.clone(),
            p1_lang: room.p1.language.map(|l| l.as_str().to_string()),
            p2_code: room.p2.code.clone(),
            p2_lang: room.p2.language.map(|l| l.as_str().to_string()),
            finished_ms: now_ms(),
        }
    }
}

#[async_trait]
pub trait MatchArchive: Send + Sync {
    async fn save(&self, record: &MatchRecord) -> Result<()>;
}

/// SQLx-backed implementation. Responsible only for persistence and row
/// mapping.
pub struct SqlxMatchArchive {
    pool: AnyPool,
}

impl SqlxMatchArchive {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchArchive for SqlxMatchArchive {
    async fn save(&self, record: &MatchRecord) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO matches (
  match_id, game_type, p1_id, p2_id,
  winner, reason, p1_score, p2_score,
  p1_code, p1_lang, p2_code, p2_lang,
  finished_ms
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(&record.match_id)
        .bind(&record.game_type)
        .bind(record.p1_id)
        .bind(record.p2_id)
        .bind(record.winner.as_str())
        .bind(&record.reason)
        .bind(record.p1_score)
        .bind(record.p2_score)
        .bind(&record.p1_code)
        .bind(&record.p1_lang)
        .bind(&record.p2_code)
        .bind(&record.p2_lang)
        .bind(record.finished_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
