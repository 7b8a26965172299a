use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::notify::{Notifier, ServerEvent, match_topic, user_topic};
use crate::queue::UserId;

/// In-process topic hub.
///
/// Each topic is a broadcast channel; the transport adapter subscribes a
/// connection to its user topic and, once matched, to the match topic.
/// Sending to a topic nobody listens on is not an error: results must be
/// published even if both clients are gone.
pub struct ChannelNotifier {
    topics: Mutex<HashMap<String, broadcast::Sender<ServerEvent>>>,
    capacity: usize,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(8),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<ServerEvent> {
        let mut topics = self.topics.lock();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe_user(&self, user_id: UserId) -> broadcast::Receiver<ServerEvent> {
        self.sender(&user_topic(user_id)).subscribe()
    }

    pub fn subscribe_match(&self, match_id: &str) -> broadcast::Receiver<ServerEvent> {
        self.sender(&match_topic(match_id)).subscribe()
    }

    fn publish(&self, topic: &str, event: ServerEvent) {
        let delivered = self.sender(topic).send(event).unwrap_or(0);
        debug!(topic, delivered, "event published");
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> Result<()> {
        self.publish(&user_topic(user_id), event);
        Ok(())
    }

    async fn send_to_match(&self, match_id: &str, event: ServerEvent) -> Result<()> {
        self.publish(&match_topic(match_id), event);
        Ok(())
    }
}
