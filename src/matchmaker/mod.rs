//! Periodic pairing scheduler.
//!
//! One tick loop per game type. Ticks for the same game type are strictly
//! sequential (the loop awaits each tick before sleeping again); different
//! game types tick in independent tasks. Queue correctness does not depend
//! on a single matcher instance existing; all queue operations are atomic
//! at the store.

pub mod map_gen;
pub mod matcher;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::error;

pub use map_gen::{JudgeMapGenerator, MapGenerator};
pub use matcher::{Matcher, TickOutcome};

/// Spawns one tick loop per game type. Each loop runs until the process
/// shuts down; a failed tick is logged and the cadence continues.
pub fn spawn_matcher_loops(
    matcher: Arc<Matcher>,
    game_types: Vec<String>,
    period: Duration,
) -> Vec<JoinHandle<()>> {
    game_types
        .into_iter()
        .map(|game_type| {
            let matcher = Arc::clone(&matcher);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // No burst catch-up after a long tick; overlap is what we
                // must avoid, not missed ticks.
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;

                    if let Err(e) = matcher.on_tick(&game_type).await {
                        error!(error = ?e, %game_type, "matcher tick failed");
                    }
                }
            })
        })
        .collect()
}
