//! The authoritative session record store.
//!
//! Open (active or paused) sessions live only in memory, one slot per
//! owner; the slot is the unit of mutual exclusion for the whole lifecycle.
//! Completed sessions are durably persisted through [`Database`].

mod db;
mod migrations;

pub use db::Database;

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    duration::{default_title, focused_duration_ms},
    error::{SessionError, SessionResult},
    models::{Session, SessionPage, SessionStatus},
};

/// An in-memory record of a not-yet-completed session.
///
/// `paused_duration_ms` accumulates completed pause intervals and never
/// decreases. `duration_snapshot_ms` is the focused time captured when the
/// session last entered `paused`; while active, focused time is recomputed
/// on demand.
#[derive(Debug, Clone)]
pub struct OpenSession {
    pub id: String,
    pub owner_id: String,
    pub start_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub paused_duration_ms: u64,
    pub duration_snapshot_ms: u64,
    pub updated_at: DateTime<Utc>,
}

impl OpenSession {
    fn new(owner_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            start_time: now,
            status: SessionStatus::Active,
            paused_duration_ms: 0,
            duration_snapshot_ms: 0,
            updated_at: now,
        }
    }

    /// Wire-shaped view of the open record as of `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Session {
        let duration_ms = match self.status {
            SessionStatus::Paused => self.duration_snapshot_ms,
            _ => focused_duration_ms(self.start_time, now, self.paused_duration_ms),
        };

        Session {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            title: default_title(self.start_time),
            description: None,
            start_time: self.start_time,
            end_time: None,
            duration_ms,
            paused_duration_ms: self.paused_duration_ms,
            status: self.status,
            rating: None,
            created_at: self.start_time,
            updated_at: self.updated_at,
        }
    }
}

/// One open-session slot per owner plus durable storage for completed
/// records. All mutation of a given session funnels through the owner's
/// slot, so no per-record locking is needed.
#[derive(Clone)]
pub struct SessionStore {
    open: Arc<Mutex<HashMap<String, OpenSession>>>,
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self {
            open: Arc::new(Mutex::new(HashMap::new())),
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Claims the owner's open-session slot. Fails with `Conflict` while an
    /// active or paused session already holds it.
    pub async fn create_if_absent(&self, owner_id: &str) -> SessionResult<OpenSession> {
        let mut open = self.open.lock().await;
        if open.contains_key(owner_id) {
            return Err(SessionError::Conflict);
        }

        let session = OpenSession::new(owner_id, Utc::now());
        open.insert(owner_id.to_string(), session.clone());
        Ok(session)
    }

    /// The owner's current open session, if any.
    pub async fn find_open(&self, owner_id: &str) -> Option<OpenSession> {
        self.open.lock().await.get(owner_id).cloned()
    }

    /// Applies `mutate` to the owner's open session under the slot lock.
    /// `NotFound` when the id does not match the held slot (or no slot is
    /// held); the closure's validation errors pass through unchanged.
    pub async fn update_open<F>(
        &self,
        session_id: &str,
        owner_id: &str,
        mutate: F,
    ) -> SessionResult<OpenSession>
    where
        F: FnOnce(&mut OpenSession) -> SessionResult<()>,
    {
        let mut open = self.open.lock().await;
        let session = match open.get_mut(owner_id) {
            Some(session) if session.id == session_id => session,
            _ => return Err(SessionError::NotFound),
        };

        mutate(session)?;
        Ok(session.clone())
    }

    /// Terminal transition: removes the open record, runs `finalize` to
    /// build the completed row, and persists it. On a storage failure the
    /// slot is restored so the completion can be retried.
    pub async fn complete<F>(
        &self,
        session_id: &str,
        owner_id: &str,
        finalize: F,
    ) -> SessionResult<Session>
    where
        F: FnOnce(&OpenSession) -> Session,
    {
        let open = {
            let mut open_map = self.open.lock().await;
            match open_map.remove(owner_id) {
                Some(existing) if existing.id == session_id => existing,
                Some(other) => {
                    open_map.insert(owner_id.to_string(), other);
                    return Err(SessionError::NotFound);
                }
                None => return Err(SessionError::NotFound),
            }
        };

        let record = finalize(&open);
        if let Err(err) = self.db.insert_completed(&record).await {
            // A clear + start may have claimed the slot while the insert
            // was in flight; the newer occupant wins.
            self.open
                .lock()
                .await
                .entry(owner_id.to_string())
                .or_insert(open);
            return Err(SessionError::Storage(err));
        }

        Ok(record)
    }

    /// Drops the open record without persisting anything. A second call for
    /// the same id fails with `NotFound`; discarded sessions never resurrect.
    pub async fn discard(&self, session_id: &str, owner_id: &str) -> SessionResult<()> {
        let mut open = self.open.lock().await;
        match open.get(owner_id) {
            Some(session) if session.id == session_id => {
                open.remove(owner_id);
                Ok(())
            }
            _ => Err(SessionError::NotFound),
        }
    }

    /// Releases the owner's slot regardless of the session id, returning
    /// whether anything was held. The recovery step behind a client's
    /// clear-then-retry on a start conflict.
    pub async fn clear_open(&self, owner_id: &str) -> bool {
        self.open.lock().await.remove(owner_id).is_some()
    }

    /// Owner-scoped lookup across open and completed records. Cross-owner
    /// access is indistinguishable from a missing session.
    pub async fn get_by_id(&self, session_id: &str, owner_id: &str) -> SessionResult<Session> {
        {
            let open = self.open.lock().await;
            if let Some(session) = open.get(owner_id) {
                if session.id == session_id {
                    return Ok(session.snapshot(Utc::now()));
                }
            }
        }

        self.db
            .get_completed(session_id, owner_id)
            .await?
            .ok_or(SessionError::NotFound)
    }

    /// Completed sessions, newest first. `page` is 1-based.
    pub async fn list_completed(
        &self,
        owner_id: &str,
        page: u64,
        page_size: u64,
    ) -> SessionResult<SessionPage> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let offset = (page - 1) * page_size;

        let sessions = self.db.list_completed(owner_id, page_size, offset).await?;
        let total = self.db.count_completed(owner_id).await?;
        let total_pages = total.div_ceil(page_size);

        Ok(SessionPage {
            sessions,
            total,
            total_pages,
        })
    }

    /// Administrative recovery: drops every open record and sweeps any
    /// unfinished rows out of storage. Returns the combined count.
    pub async fn purge_all_open_sessions(&self) -> SessionResult<u64> {
        let dropped = {
            let mut open = self.open.lock().await;
            let count = open.len() as u64;
            open.clear();
            count
        };

        let swept = self.db.delete_unfinished().await?;
        Ok(dropped + swept)
    }
}
