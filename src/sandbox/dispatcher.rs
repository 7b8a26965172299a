//! Routes claimed matches into sandbox executions.
//!
//! The dispatcher sits behind an mpsc channel so judge invocations never
//! run on the submission or tick path. Each claimed match executes in its
//! own task; matches are fully independent, and the claim gate upstream
//! guarantees at most one request per match id ever arrives here.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc::Receiver;
use tracing::{Instrument, error, info, info_span, warn};

use crate::metrics::counters::Counters;
use crate::publish::{MatchOutcome, ResultPublisher};
use crate::room::store::RoomStore;
use crate::sandbox::runner::SandboxRunner;

#[derive(Clone, Debug)]
pub struct RunRequest {
    pub match_id: String,
}

pub struct RunDispatcher {
    rooms: Arc<dyn RoomStore>,
    runner: Arc<SandboxRunner>,
    publisher: Arc<ResultPublisher>,
    counters: Counters,
}

impl RunDispatcher {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        runner: Arc<SandboxRunner>,
        publisher: Arc<ResultPublisher>,
        counters: Counters,
    ) -> Self {
        Self {
            rooms,
            runner,
            publisher,
            counters,
        }
    }

    /// Main dispatcher loop. Exits when the request channel closes.
    pub async fn run(self: Arc<Self>, mut rx: Receiver<RunRequest>) {
        info!(component = "dispatcher", event = "startup", "run dispatcher started");

        while let Some(req) = rx.recv().await {
            let dispatcher = Arc::clone(&self);
            let span = info_span!("match_execution", match_id = %req.match_id);

            tokio::spawn(async move { dispatcher.execute(req.match_id).instrument(span).await });
        }

        warn!(component = "dispatcher", event = "shutdown", "request channel closed");
    }

    /// Runs one claimed match end to end and hands the outcome to the
    /// publisher. Never panics; every failure becomes an ERROR delivery.
    async fn execute(&self, match_id: String) {
        let room = match self.rooms.get(&match_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                // Torn down between claim and execution (disconnect won).
                warn!("room gone before execution; skipping run");
                return;
            }
            Err(e) => {
                error!(error = ?e, "failed to load room for execution");
                return;
            }
        };

        let outcome = match self.runner.run_match(&room).await {
            Ok(result) => MatchOutcome::Finished(result),
            Err(e) => {
                self.counters.sandbox_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "judge invocation failed");
                MatchOutcome::Errored(format!("Execution Failed: {e}"))
            }
        };

        match self.publisher.publish(&match_id, outcome).await {
            Ok(true) => {}
            Ok(false) => info!("match completed elsewhere while running"),
            Err(e) => error!(error = ?e, "failed to publish match outcome"),
        }
    }
}
