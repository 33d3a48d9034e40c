//! Pure duration math and title/clock formatting.
//!
//! Everything here is deterministic and free of I/O so the same functions
//! serve the server-side lifecycle controller and the client timer engine.

use chrono::{DateTime, Utc};
use log::warn;

/// Focused (non-paused) duration between `start` and `as_of`, in
/// milliseconds: `max(0, as_of - start - paused_ms)`.
///
/// A negative raw value means clock skew or a pause-accounting error. That
/// is clamped to zero and logged as a data-integrity anomaly rather than
/// returned as an error; callers always get a usable duration.
pub fn focused_duration_ms(start: DateTime<Utc>, as_of: DateTime<Utc>, paused_ms: u64) -> u64 {
    let wall_ms = (as_of - start).num_milliseconds();
    let raw = wall_ms - paused_ms as i64;
    if raw < 0 {
        warn!(
            "focused duration clamped to zero (wall={}ms, paused={}ms)",
            wall_ms, paused_ms
        );
        return 0;
    }
    raw as u64
}

/// Fallback title used when a session is completed without one.
pub fn default_title(start: DateTime<Utc>) -> String {
    format!("Study Session - {}", start.format("%Y-%m-%d"))
}

/// Richer auto-generated title based on how long the session ran.
pub fn descriptive_title(focused_ms: u64, now: DateTime<Utc>) -> String {
    let minutes = focused_ms / 60_000;
    if minutes < 1 {
        format!("Quick study session at {}", now.format("%H:%M"))
    } else if minutes < 30 {
        format!("{minutes}-minute study session")
    } else if minutes < 60 {
        format!("Study session at {}", now.format("%H:%M"))
    } else {
        let hours = minutes / 60;
        let remaining = minutes % 60;
        if remaining == 0 {
            format!("{hours}-hour study session")
        } else {
            format!("{hours}h {remaining}m study session")
        }
    }
}

/// `HH:MM:SS` display form of a millisecond duration.
pub fn format_hms(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn focused_duration_subtracts_paused_time() {
        assert_eq!(focused_duration_ms(ts(0), ts(20), 5_000), 15_000);
    }

    #[test]
    fn focused_duration_with_no_pauses_is_wall_clock() {
        assert_eq!(focused_duration_ms(ts(0), ts(10), 0), 10_000);
    }

    #[test]
    fn negative_duration_clamps_to_zero() {
        // Paused longer than the wall-clock window: accounting anomaly.
        assert_eq!(focused_duration_ms(ts(0), ts(10), 60_000), 0);
        // Clock skew: end before start.
        assert_eq!(focused_duration_ms(ts(10), ts(0), 0), 0);
    }

    #[test]
    fn default_title_uses_start_date() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap();
        assert_eq!(default_title(start), "Study Session - 2024-03-09");
    }

    #[test]
    fn descriptive_title_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(descriptive_title(30_000, now), "Quick study session at 14:05");
        assert_eq!(descriptive_title(25 * 60_000, now), "25-minute study session");
        assert_eq!(descriptive_title(45 * 60_000, now), "Study session at 14:05");
        assert_eq!(descriptive_title(120 * 60_000, now), "2-hour study session");
        assert_eq!(descriptive_title(80 * 60_000, now), "1h 20m study session");
    }

    #[test]
    fn format_hms_pads_fields() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(61_000), "00:01:01");
        assert_eq!(format_hms(3_600_000 + 2 * 60_000 + 3_000), "01:02:03");
    }
}
