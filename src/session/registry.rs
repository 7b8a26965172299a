use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::queue::UserId;

/// Three mappings with connection/match lifetime. An external-store
/// implementation keys them `session_user:{sid}`, `session_match:{sid}`
/// and `user_match:{uid}`.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Records the authenticated user behind a transport session.
    async fn bind_connection(&self, session_id: &str, user_id: UserId) -> Result<()>;

    /// Records which match a transport session is playing in (set when
    /// the client joins its room).
    async fn bind_game(&self, session_id: &str, match_id: &str) -> Result<()>;

    /// Records which match a user is in (set at room creation, before the
    /// client has joined the room).
    async fn bind_user_match(&self, user_id: UserId, match_id: &str) -> Result<()>;

    async fn user_for_session(&self, session_id: &str) -> Result<Option<UserId>>;
    async fn match_for_session(&self, session_id: &str) -> Result<Option<String>>;
    async fn match_for_user(&self, user_id: UserId) -> Result<Option<String>>;

    /// Drops both session-scoped bindings for one transport session.
    async fn clear_session(&self, session_id: &str) -> Result<()>;

    /// Drops the user->match binding and any session bindings held by that
    /// user's connection. Called for both players when a match completes.
    async fn clear_user(&self, user_id: UserId) -> Result<()>;
}

#[derive(Default)]
struct Mappings {
    session_user: HashMap<String, UserId>,
    session_match: HashMap<String, String>,
    user_match: HashMap<UserId, String>,
    /// Reverse index so completing a match can clear the session bindings
    /// of both players without knowing their session ids.
    session_by_user: HashMap<UserId, String>,
}

/// Process-local registry; one lock keeps the four maps consistent.
#[derive(Default)]
pub struct InMemorySessionRegistry {
    inner: Mutex<Mappings>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    #[instrument(skip(self), target = "session")]
    async fn bind_connection(&self, session_id: &str, user_id: UserId) -> Result<()> {
        let mut m = self.inner.lock();
        m.session_user.insert(session_id.to_string(), user_id);
        m.session_by_user.insert(user_id, session_id.to_string());
        debug!("connection bound");
        Ok(())
    }

    #[instrument(skip(self), target = "session")]
    async fn bind_game(&self, session_id: &str, match_id: &str) -> Result<()> {
        let mut m = self.inner.lock();
        m.session_match
            .insert(session_id.to_string(), match_id.to_string());
        debug!("game session bound");
        Ok(())
    }

    async fn bind_user_match(&self, user_id: UserId, match_id: &str) -> Result<()> {
        let mut m = self.inner.lock();
        m.user_match.insert(user_id, match_id.to_string());
        Ok(())
    }

    async fn user_for_session(&self, session_id: &str) -> Result<Option<UserId>> {
        Ok(self.inner.lock().session_user.get(session_id).copied())
    }

    async fn match_for_session(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().session_match.get(session_id).cloned())
    }

    async fn match_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.inner.lock().user_match.get(&user_id).cloned())
    }

    #[instrument(skip(self), target = "session")]
    async fn clear_session(&self, session_id: &str) -> Result<()> {
        let mut m = self.inner.lock();
        if let Some(user_id) = m.session_user.remove(session_id) {
            if m.session_by_user.get(&user_id).map(String::as_str) == Some(session_id) {
                m.session_by_user.remove(&user_id);
            }
        }
        m.session_match.remove(session_id);
        debug!("session mappings cleared");
        Ok(())
    }

    #[instrument(skip(self), target = "session")]
    async fn clear_user(&self, user_id: UserId) -> Result<()> {
        let mut m = self.inner.lock();
        m.user_match.remove(&user_id);
        if let Some(session_id) = m.session_by_user.remove(&user_id) {
            m.session_user.remove(&session_id);
            m.session_match.remove(&session_id);
        }
        debug!("user mappings cleared");
        Ok(())
    }
}
