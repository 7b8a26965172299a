use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::counters::Counters;
use crate::notify::{Notifier, PLAYER_SUBMITTED, ServerEvent};
use crate::queue::UserId;
use crate::room::store::{RoomStore, SubmitOutcome};
use crate::sandbox::dispatcher::RunRequest;
use crate::sandbox::harness::Language;

/// Submission surface of the match room.
///
/// Applies the store-level state machine, announces the submission to the
/// room (role only), and, when this submission completes the pair, wins
/// or loses the run claim. Only the claim winner enqueues a run request,
/// so the number of sandbox invocations per match is at most one no
/// matter how submissions interleave.
pub struct SubmissionService {
    rooms: Arc<dyn RoomStore>,
    notifier: Arc<dyn Notifier>,
    run_tx: Sender<RunRequest>,
    counters: Counters,
}

impl SubmissionService {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        notifier: Arc<dyn Notifier>,
        run_tx: Sender<RunRequest>,
        counters: Counters,
    ) -> Self {
        Self {
            rooms,
            notifier,
            run_tx,
            counters,
        }
    }

    #[instrument(skip(self, code), target = "room")]
    pub async fn handle_submission(
        &self,
        match_id: &str,
        user_id: UserId,
        code: String,
        language: Language,
    ) -> Result<()> {
        let outcome = self
            .rooms
            .submit_code(match_id, user_id, code, language)
            .await?;

        let (role, both_ready) = match outcome {
            SubmitOutcome::Stored { role, both_ready } => (role, both_ready),
            // All three are deliberate no-ops toward the caller; the store
            // already logged the specifics.
            SubmitOutcome::RoomMissing
            | SubmitOutcome::UnknownPlayer
            | SubmitOutcome::Locked => return Ok(()),
        };

        // UI hint for the opponent; never includes the code itself.
        if let Err(e) = self
            .notifier
            .send_to_match(
                match_id,
                ServerEvent::Notification {
                    message: PLAYER_SUBMITTED.to_string(),
                    role,
                },
            )
            .await
        {
            warn!(error = ?e, "failed to broadcast submission notice");
        }

        if !both_ready {
            debug!("waiting for opponent");
            return Ok(());
        }

        if !self.rooms.try_claim_run(match_id).await? {
            // A concurrent submission claimed the run first.
            debug!("run already claimed");
            return Ok(());
        }

        self.counters.runs_started.fetch_add(1, Ordering::Relaxed);
        info!("all players ready; starting execution");

        if self
            .run_tx
            .send(RunRequest {
                match_id: match_id.to_string(),
            })
            .await
            .is_err()
        {
            error!("run dispatcher queue closed; match cannot execute");
        }

        Ok(())
    }
}
