//! Aggregation of completed sessions into the read-only summary handed to
//! the advice generator. Reporting only; the lifecycle core never depends
//! on anything here.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::Serialize;

use crate::models::Session;

/// Sessions older than this are left out of the summary.
pub const LOOKBACK_DAYS: i64 = 30;
/// At most this many sessions feed the aggregates.
const MAX_SESSIONS: usize = 50;
/// How many per-session digests the summary carries.
const RECENT_DIGESTS: usize = 10;

const MS_PER_MINUTE: f64 = 60_000.0;
const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDigest {
    pub title: String,
    pub focused_minutes: u64,
    pub paused_minutes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub date: DateTime<Utc>,
}

/// When the user tends to study, derived from session start times.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPatterns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_active_day: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_active_hour: Option<u32>,
    /// Distinct weekdays with at least one session, 0..=7.
    pub days_studied: u32,
    pub day_histogram: [u32; 7],
    pub hour_histogram: [u32; 24],
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyStatistics {
    pub total_sessions: usize,
    pub total_study_hours: f64,
    pub total_focused_hours: f64,
    pub total_paused_hours: f64,
    pub average_session_minutes: u64,
    pub average_paused_minutes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    pub patterns: ActivityPatterns,
    pub recent_sessions: Vec<SessionDigest>,
}

impl StudyStatistics {
    /// Summarizes `sessions` (any order) as of `now`. Only completed
    /// sessions started within the lookback window count, newest first,
    /// capped at [`MAX_SESSIONS`].
    pub fn from_sessions(sessions: &[Session], now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(LOOKBACK_DAYS);
        let mut recent: Vec<&Session> = sessions
            .iter()
            .filter(|session| session.end_time.is_some() && session.start_time >= cutoff)
            .collect();
        recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        recent.truncate(MAX_SESSIONS);

        let total_sessions = recent.len();
        let focused_ms: u64 = recent.iter().map(|s| s.duration_ms).sum();
        let paused_ms: u64 = recent.iter().map(|s| s.paused_duration_ms).sum();
        let study_ms = focused_ms + paused_ms;

        let (average_session_minutes, average_paused_minutes) = if total_sessions > 0 {
            (
                (study_ms as f64 / total_sessions as f64 / MS_PER_MINUTE).round() as u64,
                (paused_ms as f64 / total_sessions as f64 / MS_PER_MINUTE).round() as u64,
            )
        } else {
            (0, 0)
        };

        let rated: Vec<u8> = recent.iter().filter_map(|s| s.rating).collect();
        let average_rating = if rated.is_empty() {
            None
        } else {
            Some(rated.iter().map(|r| *r as f64).sum::<f64>() / rated.len() as f64)
        };

        let patterns = analyze_patterns(&recent);
        let recent_sessions = recent
            .iter()
            .take(RECENT_DIGESTS)
            .map(|session| SessionDigest {
                title: session.title.clone(),
                focused_minutes: session.duration_ms / 60_000,
                paused_minutes: session.paused_duration_ms / 60_000,
                rating: session.rating,
                date: session.start_time,
            })
            .collect();

        Self {
            total_sessions,
            total_study_hours: round2(study_ms as f64 / MS_PER_HOUR),
            total_focused_hours: round2(focused_ms as f64 / MS_PER_HOUR),
            total_paused_hours: round2(paused_ms as f64 / MS_PER_HOUR),
            average_session_minutes,
            average_paused_minutes,
            average_rating,
            patterns,
            recent_sessions,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn analyze_patterns(sessions: &[&Session]) -> ActivityPatterns {
    let mut day_histogram = [0u32; 7];
    let mut hour_histogram = [0u32; 24];

    for session in sessions {
        day_histogram[session.start_time.weekday().num_days_from_monday() as usize] += 1;
        hour_histogram[session.start_time.hour() as usize] += 1;
    }

    let most_active_day = day_histogram
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by_key(|(_, count)| **count)
        .map(|(index, _)| {
            let weekday = match index {
                0 => Weekday::Mon,
                1 => Weekday::Tue,
                2 => Weekday::Wed,
                3 => Weekday::Thu,
                4 => Weekday::Fri,
                5 => Weekday::Sat,
                _ => Weekday::Sun,
            };
            weekday_name(weekday).to_string()
        });

    let most_active_hour = hour_histogram
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by_key(|(_, count)| **count)
        .map(|(hour, _)| hour as u32);

    let days_studied = day_histogram.iter().filter(|count| **count > 0).count() as u32;

    ActivityPatterns {
        most_active_day,
        most_active_hour,
        days_studied,
        day_histogram,
        hour_histogram,
    }
}

/// The external collaborator that turns a summary plus a user message into
/// coaching text. The core only ever hands it read-only statistics.
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn advise(&self, statistics: &StudyStatistics, message: &str)
        -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;
    use chrono::TimeZone;

    fn completed(
        start: DateTime<Utc>,
        focused_ms: u64,
        paused_ms: u64,
        rating: Option<u8>,
    ) -> Session {
        Session {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: "alice".into(),
            title: "session".into(),
            description: None,
            start_time: start,
            end_time: Some(start + Duration::milliseconds((focused_ms + paused_ms) as i64)),
            duration_ms: focused_ms,
            paused_duration_ms: paused_ms,
            status: SessionStatus::Completed,
            rating,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn aggregates_totals_and_averages() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let sessions = vec![
            completed(now - Duration::days(1), 3_600_000, 600_000, Some(4)),
            completed(now - Duration::days(2), 1_800_000, 0, Some(5)),
            completed(now - Duration::days(3), 1_800_000, 300_000, None),
        ];

        let stats = StudyStatistics::from_sessions(&sessions, now);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.total_focused_hours, 2.0);
        assert_eq!(stats.total_paused_hours, 0.25);
        assert_eq!(stats.total_study_hours, 2.25);
        assert_eq!(stats.average_rating, Some(4.5));
        assert_eq!(stats.recent_sessions.len(), 3);
        // Newest first.
        assert_eq!(stats.recent_sessions[0].focused_minutes, 60);
    }

    #[test]
    fn old_sessions_fall_outside_the_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let sessions = vec![
            completed(now - Duration::days(1), 600_000, 0, None),
            completed(now - Duration::days(45), 600_000, 0, Some(5)),
        ];

        let stats = StudyStatistics::from_sessions(&sessions, now);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.average_rating, None);
    }

    #[test]
    fn patterns_pick_the_busiest_day_and_hour() {
        // 2024-03-04 is a Monday.
        let monday = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let sessions = vec![
            completed(monday, 600_000, 0, None),
            completed(monday + Duration::hours(1), 600_000, 0, None),
            completed(monday + Duration::days(1), 600_000, 0, None),
        ];

        let stats = StudyStatistics::from_sessions(&sessions, now);
        assert_eq!(stats.patterns.most_active_day.as_deref(), Some("Monday"));
        assert_eq!(stats.patterns.most_active_hour, Some(9));
        assert_eq!(stats.patterns.days_studied, 2);
    }

    #[test]
    fn empty_input_yields_an_empty_summary() {
        let stats = StudyStatistics::from_sessions(&[], Utc::now());
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.total_study_hours, 0.0);
        assert!(stats.patterns.most_active_day.is_none());
        assert!(stats.recent_sessions.is_empty());
    }
}
