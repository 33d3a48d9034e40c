//! Server-side orchestration of the session state machine
//! (`active ⇄ paused → completed`, with discard from either open state).

use chrono::{DateTime, Utc};
use log::info;

use crate::{
    duration::{default_title, focused_duration_ms},
    error::{SessionError, SessionResult},
    models::{EndSessionRequest, Session, SessionPage, SessionStatus, SessionUpdate},
    store::{OpenSession, SessionStore},
};

pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Validates transitions and duration arithmetic; the store holds the
/// single-active-session invariant, the calculator does the math.
#[derive(Clone)]
pub struct LifecycleController {
    store: SessionStore,
}

impl LifecycleController {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Opens a session for `owner_id`. `Conflict` while the owner already
    /// holds an open one; callers recover with [`clear_open_session`]
    /// followed by a retry.
    ///
    /// [`clear_open_session`]: LifecycleController::clear_open_session
    pub async fn start(&self, owner_id: &str) -> SessionResult<Session> {
        let open = self.store.create_if_absent(owner_id).await?;
        info!("session {} started for owner {}", open.id, owner_id);
        Ok(open.snapshot(Utc::now()))
    }

    /// Pause/resume and pause-accounting updates on an open session.
    ///
    /// Entering `paused` snapshots the focused duration at this instant.
    /// Returning to `active` trusts the caller's accumulated
    /// `pausedDurationMs` (the caller folds in the pause interval it just
    /// finished) but rejects any decrease.
    pub async fn set_status(
        &self,
        session_id: &str,
        owner_id: &str,
        update: SessionUpdate,
    ) -> SessionResult<Session> {
        let now = Utc::now();
        let open = self
            .store
            .update_open(session_id, owner_id, |open| {
                apply_update(open, &update, now)
            })
            .await?;

        Ok(open.snapshot(now))
    }

    /// Terminal transition. Computes the authoritative end time, paused
    /// total, and focused duration, persists the completed record, and
    /// frees the owner's slot.
    pub async fn end(
        &self,
        session_id: &str,
        owner_id: &str,
        request: EndSessionRequest,
    ) -> SessionResult<Session> {
        if let Some(rating) = request.rating {
            if !(1..=5).contains(&rating) {
                return Err(SessionError::bad_request(
                    "rating must be between 1 and 5 stars",
                ));
            }
        }
        for hint in [request.focused_duration_ms, request.paused_duration_ms] {
            if hint.is_some_and(|value| value < 0) {
                return Err(SessionError::bad_request(
                    "duration hints must be non-negative",
                ));
            }
        }

        let end_time = Utc::now();
        let record = self
            .store
            .complete(session_id, owner_id, |open| {
                build_completed(open, &request, end_time)
            })
            .await?;

        info!(
            "session {} completed for owner {} (focused {}ms, paused {}ms)",
            record.id, owner_id, record.duration_ms, record.paused_duration_ms
        );
        Ok(record)
    }

    /// Abandons an open session without persisting anything.
    pub async fn discard(&self, session_id: &str, owner_id: &str) -> SessionResult<()> {
        self.store.discard(session_id, owner_id).await?;
        info!("session {session_id} discarded by owner {owner_id}");
        Ok(())
    }

    /// Releases the owner's open-session slot whatever id it holds; a no-op
    /// when nothing is open. Used by clients to clear a session orphaned by
    /// a crash before retrying `start`.
    pub async fn clear_open_session(&self, owner_id: &str) -> SessionResult<()> {
        if self.store.clear_open(owner_id).await {
            info!("cleared stale open session for owner {owner_id}");
        }
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str, owner_id: &str) -> SessionResult<Session> {
        self.store.get_by_id(session_id, owner_id).await
    }

    /// Completed sessions, newest first; `page` is 1-based and a zero
    /// `page_size` falls back to [`DEFAULT_PAGE_SIZE`].
    pub async fn list_sessions(
        &self,
        owner_id: &str,
        page: u64,
        page_size: u64,
    ) -> SessionResult<SessionPage> {
        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        self.store.list_completed(owner_id, page, page_size).await
    }

    /// Administrative bulk cleanup of every non-completed record.
    pub async fn purge_open_sessions(&self) -> SessionResult<u64> {
        let purged = self.store.purge_all_open_sessions().await?;
        info!("purged {purged} open session(s)");
        Ok(purged)
    }
}

fn apply_update(
    open: &mut OpenSession,
    update: &SessionUpdate,
    now: DateTime<Utc>,
) -> SessionResult<()> {
    if let Some(paused_ms) = update.paused_duration_ms {
        if paused_ms < open.paused_duration_ms {
            return Err(SessionError::bad_request(
                "pausedDurationMs may not decrease",
            ));
        }
        open.paused_duration_ms = paused_ms;
    }

    match update.status {
        None => {}
        Some(SessionStatus::Completed) => {
            return Err(SessionError::bad_request(
                "sessions are completed through the end operation",
            ));
        }
        Some(SessionStatus::Paused) => {
            if open.status == SessionStatus::Active {
                open.duration_snapshot_ms =
                    focused_duration_ms(open.start_time, now, open.paused_duration_ms);
            }
            open.status = SessionStatus::Paused;
        }
        Some(SessionStatus::Active) => {
            open.status = SessionStatus::Active;
        }
    }

    open.updated_at = now;
    Ok(())
}

fn build_completed(
    open: &OpenSession,
    request: &EndSessionRequest,
    end_time: DateTime<Utc>,
) -> Session {
    let wall_ms = (end_time - open.start_time).num_milliseconds().max(0) as u64;

    // The server-held paused total is authoritative. A larger client hint
    // carries the final pause interval the server never saw; anything else
    // is a stale client and is ignored. The total can never exceed the
    // wall-clock window.
    let mut paused_ms = open.paused_duration_ms;
    if let Some(hint) = request.paused_duration_ms {
        let hint = hint as u64;
        if hint > paused_ms {
            paused_ms = hint.min(wall_ms);
        }
    }

    let duration_ms = focused_duration_ms(open.start_time, end_time, paused_ms);
    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_title(open.start_time));

    Session {
        id: open.id.clone(),
        owner_id: open.owner_id.clone(),
        title,
        description: request.description.clone(),
        start_time: open.start_time,
        end_time: Some(end_time),
        duration_ms,
        paused_duration_ms: paused_ms,
        status: SessionStatus::Completed,
        rating: request.rating,
        created_at: open.start_time,
        updated_at: end_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use chrono::TimeZone;

    fn controller() -> (LifecycleController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("sessions.db")).unwrap();
        (LifecycleController::new(SessionStore::new(db)), dir)
    }

    fn open_at(secs_ago: i64) -> OpenSession {
        let start = Utc::now() - chrono::Duration::seconds(secs_ago);
        OpenSession {
            id: "s1".into(),
            owner_id: "alice".into(),
            start_time: start,
            status: SessionStatus::Active,
            paused_duration_ms: 0,
            duration_snapshot_ms: 0,
            updated_at: start,
        }
    }

    #[tokio::test]
    async fn start_returns_active_zero_duration_snapshot() {
        let (controller, _dir) = controller();
        let session = controller.start("alice").await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.paused_duration_ms, 0);
        assert!(session.duration_ms < 1_000);
        assert!(session.end_time.is_none());
    }

    #[tokio::test]
    async fn double_start_yields_one_success_one_conflict() {
        let (controller, _dir) = controller();
        controller.start("alice").await.unwrap();
        let err = controller.start("alice").await.unwrap_err();
        assert!(matches!(err, SessionError::Conflict));
    }

    #[tokio::test]
    async fn conflict_resolves_via_clear_then_retry() {
        let (controller, _dir) = controller();
        let orphaned = controller.start("alice").await.unwrap();
        controller.clear_open_session("alice").await.unwrap();
        let fresh = controller.start("alice").await.unwrap();
        assert_ne!(fresh.id, orphaned.id);
    }

    #[tokio::test]
    async fn paused_duration_may_not_decrease() {
        let (controller, _dir) = controller();
        let session = controller.start("alice").await.unwrap();

        controller
            .set_status(
                &session.id,
                "alice",
                SessionUpdate {
                    status: Some(SessionStatus::Active),
                    paused_duration_ms: Some(5_000),
                },
            )
            .await
            .unwrap();

        let err = controller
            .set_status(
                &session.id,
                "alice",
                SessionUpdate {
                    status: None,
                    paused_duration_ms: Some(3_000),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::BadRequest(_)));
    }

    #[tokio::test]
    async fn completing_through_set_status_is_rejected() {
        let (controller, _dir) = controller();
        let session = controller.start("alice").await.unwrap();
        let err = controller
            .set_status(
                &session.id,
                "alice",
                SessionUpdate {
                    status: Some(SessionStatus::Completed),
                    paused_duration_ms: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::BadRequest(_)));
    }

    #[tokio::test]
    async fn end_on_unknown_id_is_not_found_and_never_double_completes() {
        let (controller, _dir) = controller();
        let err = controller
            .end("missing", "alice", EndSessionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));

        let session = controller.start("alice").await.unwrap();
        controller
            .end(&session.id, "alice", EndSessionRequest::default())
            .await
            .unwrap();
        let err = controller
            .end(&session.id, "alice", EndSessionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn rating_outside_one_to_five_is_rejected() {
        let (controller, _dir) = controller();
        let session = controller.start("alice").await.unwrap();

        for bad in [0u8, 6] {
            let err = controller
                .end(
                    &session.id,
                    "alice",
                    EndSessionRequest {
                        rating: Some(bad),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, SessionError::BadRequest(_)));
        }

        // The rejected attempts must not have consumed the session.
        let record = controller
            .end(
                &session.id,
                "alice",
                EndSessionRequest {
                    rating: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.rating, Some(4));
    }

    #[tokio::test]
    async fn negative_duration_hints_are_rejected() {
        let (controller, _dir) = controller();
        let session = controller.start("alice").await.unwrap();
        let err = controller
            .end(
                &session.id,
                "alice",
                EndSessionRequest {
                    paused_duration_ms: Some(-1),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::BadRequest(_)));
    }

    #[tokio::test]
    async fn end_defaults_title_from_start_date() {
        let (controller, _dir) = controller();
        let session = controller.start("alice").await.unwrap();
        let record = controller
            .end(&session.id, "alice", EndSessionRequest::default())
            .await
            .unwrap();
        assert!(record.title.starts_with("Study Session - "));
        assert_eq!(record.status, SessionStatus::Completed);
    }

    #[test]
    fn pause_and_resume_accounting_matches_the_identity() {
        // 20s wall clock, 5s of it paused: focused must be 15s and the
        // durationMs = endTime - startTime - pausedDurationMs identity holds.
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let mut open = OpenSession {
            id: "s1".into(),
            owner_id: "alice".into(),
            start_time: start,
            status: SessionStatus::Active,
            paused_duration_ms: 0,
            duration_snapshot_ms: 0,
            updated_at: start,
        };

        // Pause after 10s of focus.
        apply_update(
            &mut open,
            &SessionUpdate {
                status: Some(SessionStatus::Paused),
                paused_duration_ms: None,
            },
            start + chrono::Duration::seconds(10),
        )
        .unwrap();
        assert_eq!(open.duration_snapshot_ms, 10_000);

        // Resume 5s later; the client reports the finished pause interval.
        apply_update(
            &mut open,
            &SessionUpdate {
                status: Some(SessionStatus::Active),
                paused_duration_ms: Some(5_000),
            },
            start + chrono::Duration::seconds(15),
        )
        .unwrap();

        let end_time = start + chrono::Duration::seconds(20);
        let record = build_completed(&open, &EndSessionRequest::default(), end_time);
        assert_eq!(record.paused_duration_ms, 5_000);
        assert_eq!(record.duration_ms, 15_000);
        let wall = (record.end_time.unwrap() - record.start_time).num_milliseconds() as u64;
        assert_eq!(record.duration_ms, wall - record.paused_duration_ms);
    }

    #[test]
    fn larger_paused_hint_covers_final_inflight_pause() {
        let open = {
            let mut open = open_at(0);
            open.start_time = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
            open.paused_duration_ms = 2_000;
            open
        };
        let end_time = open.start_time + chrono::Duration::seconds(30);

        // Client saw one more pause interval than the server.
        let record = build_completed(
            &open,
            &EndSessionRequest {
                paused_duration_ms: Some(7_000),
                ..Default::default()
            },
            end_time,
        );
        assert_eq!(record.paused_duration_ms, 7_000);
        assert_eq!(record.duration_ms, 23_000);

        // A stale (smaller) hint is ignored.
        let record = build_completed(
            &open,
            &EndSessionRequest {
                paused_duration_ms: Some(500),
                ..Default::default()
            },
            end_time,
        );
        assert_eq!(record.paused_duration_ms, 2_000);

        // An absurd hint is capped at the wall-clock window, and the
        // focused duration floors at zero instead of going negative.
        let record = build_completed(
            &open,
            &EndSessionRequest {
                paused_duration_ms: Some(600_000),
                ..Default::default()
            },
            end_time,
        );
        assert_eq!(record.paused_duration_ms, 30_000);
        assert_eq!(record.duration_ms, 0);
    }
}
