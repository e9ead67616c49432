//! Wall-clock helper for protocol timestamps

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch on the local clock.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
