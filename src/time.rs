use chrono::Utc;

/// Wall-clock milliseconds since the Unix epoch.
///
/// Queue scores and result timestamps use this single source so that
/// ordering comparisons are consistent across components.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
