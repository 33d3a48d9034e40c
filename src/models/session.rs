use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }

    /// Open means not yet completed: the session still accepts transitions.
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionStatus::Completed)
    }
}

/// A study session as seen over the wire.
///
/// `duration_ms` is always the focused (non-paused) elapsed time. For open
/// sessions it is a snapshot taken when the record was produced; once the
/// status is `completed` the whole record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub paused_duration_ms: u64,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a client may change on an open session. Only `active` and
/// `paused` are accepted as target statuses; completion goes through the
/// dedicated end operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_duration_ms: Option<u64>,
}

/// Terminal fields supplied when completing a session. The duration fields
/// are client-side hints; the server record stays authoritative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused_duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_duration_ms: Option<i64>,
}

/// One page of completed sessions, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: u64,
    pub total_pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_serializes_with_camel_case_fields() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap();
        let session = Session {
            id: "s1".into(),
            owner_id: "u1".into(),
            title: "Algebra review".into(),
            description: None,
            start_time: start,
            end_time: Some(start + chrono::Duration::seconds(20)),
            duration_ms: 15_000,
            paused_duration_ms: 5_000,
            status: SessionStatus::Completed,
            rating: Some(4),
            created_at: start,
            updated_at: start,
        };

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["ownerId"], "u1");
        assert_eq!(json["durationMs"], 15_000);
        assert_eq!(json["pausedDurationMs"], 5_000);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["rating"], 4);
        // Absent optionals are omitted, not null.
        assert!(json.get("description").is_none());
    }

    #[test]
    fn update_round_trips_through_json() {
        let update = SessionUpdate {
            status: Some(SessionStatus::Paused),
            paused_duration_ms: Some(1_500),
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"pausedDurationMs\":1500"));
        let back: SessionUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn open_statuses_are_open_and_completed_is_not() {
        assert!(SessionStatus::Active.is_open());
        assert!(SessionStatus::Paused.is_open());
        assert!(!SessionStatus::Completed.is_open());
    }
}
