//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Convert whole seconds to a chrono duration, saturating instead of panicking
pub fn secs_to_chrono(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX / 1000);
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

/// Milliseconds elapsed between two timestamps (zero if `later` precedes `earlier`)
pub fn elapsed_ms(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    later
        .signed_duration_since(earlier)
        .num_milliseconds()
        .max(0) as u64
}
