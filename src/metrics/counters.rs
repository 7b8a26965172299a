use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub matches_created: Arc<AtomicU64>,
    pub ticks_empty: Arc<AtomicU64>,
    pub ticks_raced: Arc<AtomicU64>,
    pub mapgen_failures: Arc<AtomicU64>,

    pub runs_started: Arc<AtomicU64>,
    pub sandbox_errors: Arc<AtomicU64>,

    pub forfeits: Arc<AtomicU64>,
    pub archive_failures: Arc<AtomicU64>,
}
