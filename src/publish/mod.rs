//! Single completion path for every way a match can end.
//!
//! Normal finishes (sandbox), judge failures, and forfeitures all route
//! through `ResultPublisher::publish`. The publisher removes the room
//! first, atomically; whichever caller receives the room owns delivery,
//! everyone else becomes a no-op. That one rule prevents double publishes
//! and orphaned rooms alike.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::{MatchArchive, MatchRecord};
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::notify::{Notifier, ServerEvent};
use crate::room::model::{MatchResult, RoomStatus};
use crate::room::store::RoomStore;
use crate::session::registry::SessionRegistry;

/// Terminal outcome routed into the publisher.
#[derive(Clone, Debug)]
pub enum MatchOutcome {
    /// A structurally complete result: judge-produced or synthesized
    /// forfeiture.
    Finished(MatchResult),
    /// The judge failed; clients get an ERROR event and nothing is
    /// archived.
    Errored(String),
}

pub struct ResultPublisher {
    rooms: Arc<dyn RoomStore>,
    registry: Arc<dyn SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    archive: Arc<dyn MatchArchive>,
    counters: Counters,
}

impl ResultPublisher {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        registry: Arc<dyn SessionRegistry>,
        notifier: Arc<dyn Notifier>,
        archive: Arc<dyn MatchArchive>,
        counters: Counters,
    ) -> Self {
        Self {
            rooms,
            registry,
            notifier,
            archive,
            counters,
        }
    }

    /// Delivers the outcome and tears the match down.
    ///
    /// Returns `true` if this call completed the match, `false` if the
    /// room was already gone (someone else completed it first).
    #[instrument(skip(self, outcome), target = "publisher")]
    pub async fn publish(&self, match_id: &str, outcome: MatchOutcome) -> Result<bool> {
        let final_status = match outcome {
            MatchOutcome::Finished(_) => RoomStatus::Finished,
            MatchOutcome::Errored(_) => RoomStatus::Aborted,
        };

        let Some(room) = self.rooms.take(match_id, final_status).await? else {
            debug!("no live room; match already completed elsewhere");
            return Ok(false);
        };

        match outcome {
            MatchOutcome::Finished(result) => {
                let record = MatchRecord::from_room(&room, &result);
                let saved = warn_if_slow("archive_save", Duration::from_millis(200), async {
                    self.archive.save(&record).await
                })
                .await;
                if let Err(e) = saved {
                    self.counters.archive_failures.fetch_add(1, Ordering::Relaxed);
                    error!(error = ?e, "failed to archive match result; delivering anyway");
                }

                if let Err(e) = self
                    .notifier
                    .send_to_match(match_id, ServerEvent::Result { result })
                    .await
                {
                    warn!(error = ?e, "result delivery failed");
                }
            }
            MatchOutcome::Errored(message) => {
                if let Err(e) = self
                    .notifier
                    .send_to_match(match_id, ServerEvent::Error { error: message })
                    .await
                {
                    warn!(error = ?e, "error delivery failed");
                }
            }
        }

        for user_id in [room.p1.user_id, room.p2.user_id] {
            if let Err(e) = self.registry.clear_user(user_id).await {
                warn!(user_id, error = ?e, "failed to clear session mappings");
            }
        }

        info!(status = ?final_status, "match completed and room torn down");
        Ok(true)
    }
}
