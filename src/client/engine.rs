//! The client timer engine.
//!
//! Mirrors the server record optimistically: every user action transitions
//! the local state machine first, and server synchronization happens
//! asynchronously around it. A 1-second ticker publishes display updates
//! and heartbeats; it never performs network I/O inline, so a slow server
//! can never stall the clock. Updates that fail with a transient error are
//! queued and replayed in submission order.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};

use crate::{
    duration::descriptive_title,
    models::{EndSessionRequest, Session, SessionStatus, SessionUpdate},
};

use super::{
    state::{is_offline_session, EngineState, EngineStatus},
    transport::{ApiError, SessionApi},
};

use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const HEARTBEAT_EVERY_TICKS: u32 = 30;

/// One state-changing update that could not reach the server. Replayed
/// strictly in submission order on reconnect; never coalesced.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub session_id: String,
    pub update: SessionUpdate,
    pub queued_at: DateTime<Utc>,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum EngineEvent {
    StateChanged {
        status: EngineStatus,
        focused_ms: u64,
        paused_ms: u64,
    },
    Tick {
        focused_ms: u64,
        paused_ms: u64,
    },
    SyncWarning {
        message: String,
    },
    SessionCompleted {
        outcome: EndOutcome,
    },
}

/// What the UI shows once a session ends. The local figures are always
/// present; `server_record` carries the authoritative persisted session
/// when the completion reached the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndOutcome {
    pub session_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub focused_ms: u64,
    pub paused_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_record: Option<Session>,
}

impl EndOutcome {
    pub fn synced(&self) -> bool {
        self.server_record.is_some()
    }
}

#[derive(Clone)]
pub struct TimerEngine {
    state: Arc<Mutex<EngineState>>,
    api: Arc<dyn SessionApi>,
    pending: Arc<Mutex<VecDeque<PendingUpdate>>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl TimerEngine {
    pub fn new(api: Arc<dyn SessionApi>) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            state: Arc::new(Mutex::new(EngineState::new())),
            api,
            pending: Arc::new(Mutex::new(VecDeque::new())),
            ticker: Arc::new(Mutex::new(None)),
            events,
        };
        (engine, receiver)
    }

    pub async fn snapshot(&self) -> EngineState {
        let mut state = self.state.lock().await;
        state.sync_from_anchors();
        state.clone()
    }

    pub async fn pending_updates(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Starts a session. The local clock begins immediately; server
    /// creation happens afterwards and a failure only downgrades the
    /// session to local-only mode.
    pub async fn start(&self) -> Result<EngineState> {
        {
            let state = self.state.lock().await;
            if state.status != EngineStatus::Idle {
                bail!("a session is already running");
            }
        }

        let started_at = Utc::now();
        {
            let mut state = self.state.lock().await;
            state.begin(started_at, Instant::now());
        }
        self.spawn_ticker().await;

        let session_id = match self.create_server_session().await {
            Some(id) => id,
            None => {
                log_warn!("session creation unreachable, continuing in local-only mode");
                format!("offline_{}", started_at.timestamp_millis())
            }
        };

        {
            let mut state = self.state.lock().await;
            state.session_id = Some(session_id);
        }
        self.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    /// Pauses the running session; local state first, then a best-effort
    /// server update.
    pub async fn pause(&self) -> Result<EngineState> {
        let (session_id, paused_ms) = {
            let mut state = self.state.lock().await;
            if state.status != EngineStatus::Active {
                bail!("no active session to pause");
            }
            state.pause(Instant::now());
            (state.session_id.clone(), state.paused_ms)
        };
        self.cancel_ticker().await;
        self.emit_state_changed().await;

        if let Some(id) = session_id {
            self.send_update(
                &id,
                SessionUpdate {
                    status: Some(SessionStatus::Paused),
                    paused_duration_ms: Some(paused_ms),
                },
            )
            .await;
        }
        Ok(self.snapshot().await)
    }

    /// Resumes a paused session, folding the finished pause interval into
    /// the accumulated total reported to the server.
    pub async fn resume(&self) -> Result<EngineState> {
        let (session_id, paused_ms) = {
            let mut state = self.state.lock().await;
            if state.status != EngineStatus::Paused {
                bail!("no paused session to resume");
            }
            state.resume();
            (state.session_id.clone(), state.paused_ms)
        };
        self.spawn_ticker().await;
        self.emit_state_changed().await;

        if let Some(id) = session_id {
            self.send_update(
                &id,
                SessionUpdate {
                    status: Some(SessionStatus::Active),
                    paused_duration_ms: Some(paused_ms),
                },
            )
            .await;
        }
        Ok(self.snapshot().await)
    }

    /// Ends the session. The local figures are final immediately; the
    /// server's persisted record is fetched through the one call whose
    /// failure is allowed to surface (as an unsynced outcome plus a
    /// warning event), never as a lost session.
    pub async fn end(&self, request: EndSessionRequest) -> Result<EndOutcome> {
        let (session_id, started_at, focused_ms, paused_ms) = {
            let mut state = self.state.lock().await;
            if !matches!(state.status, EngineStatus::Active | EngineStatus::Paused) {
                bail!("no open session to end");
            }
            let (focused, paused) = state.finalize();
            let id = state
                .session_id
                .clone()
                .unwrap_or_else(|| format!("offline_{}", Utc::now().timestamp_millis()));
            let started_at = state.started_at.unwrap_or_else(Utc::now);
            (id, started_at, focused, paused)
        };
        self.cancel_ticker().await;
        self.emit_state_changed().await;

        let ended_at = Utc::now();
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| descriptive_title(focused_ms, ended_at));
        let request = EndSessionRequest {
            title: Some(title.clone()),
            description: request.description,
            rating: request.rating,
            focused_duration_ms: Some(focused_ms as i64),
            paused_duration_ms: Some(paused_ms as i64),
        };

        let offline = is_offline_session(&session_id);
        let server_record = if offline {
            // Nothing queued for this session can ever replay, and the
            // server has no honest record of when it ran: a fresh record
            // created now would carry near-zero server timestamps. The
            // session is acknowledged locally only.
            self.pending.lock().await.clear();
            log_warn!("offline session {session_id} ended; recorded locally only");
            None
        } else {
            self.replay_pending().await;
            match self.api.end_session(&session_id, request.clone()).await {
                Ok(session) => Some(session),
                Err(err) => {
                    log_error!("failed to persist completed session: {err}");
                    None
                }
            }
        };

        // Server figures win whenever the server tracked this session live.
        let (focused_ms, paused_ms) = match &server_record {
            Some(record) => (record.duration_ms, record.paused_duration_ms),
            None => (focused_ms, paused_ms),
        };

        let outcome = EndOutcome {
            session_id: server_record
                .as_ref()
                .map(|record| record.id.clone())
                .unwrap_or(session_id),
            title,
            started_at,
            ended_at,
            focused_ms,
            paused_ms,
            server_record,
        };

        if !outcome.synced() {
            self.emit(EngineEvent::SyncWarning {
                message: "unable to save the session to the server; it was recorded locally"
                    .to_string(),
            });
        }
        self.emit(EngineEvent::SessionCompleted {
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    /// Best-effort completion for navigation-away or unmount: fire and
    /// forget, with an auto-generated title. Never blocks the caller.
    pub fn end_detached(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.end(EndSessionRequest::default()).await {
                log_warn!("detached session end skipped: {err}");
            }
        });
    }

    /// Returns to idle after a completed session.
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.status != EngineStatus::Completed {
            bail!("only a completed session can be reset");
        }
        state.reset();
        drop(state);
        self.pending.lock().await.clear();
        self.emit_state_changed().await;
        Ok(())
    }

    /// Drains the offline queue in submission order. Stops at the first
    /// transient failure so ordering is preserved; definitively rejected
    /// updates are dropped. Returns whether the queue is empty afterwards.
    pub async fn replay_pending(&self) -> bool {
        let mut pending = self.pending.lock().await;
        while let Some(front) = pending.front() {
            if is_offline_session(&front.session_id) {
                // No server session to replay against.
                return false;
            }
            match self
                .api
                .update_session(&front.session_id, front.update.clone())
                .await
            {
                Ok(_) => {
                    pending.pop_front();
                }
                Err(err) if err.is_transient() => {
                    log_warn!("replay interrupted, {} update(s) still queued: {err}", pending.len());
                    return false;
                }
                Err(err) => {
                    log_error!("queued update rejected by the server, dropping it: {err}");
                    pending.pop_front();
                }
            }
        }
        true
    }

    async fn create_server_session(&self) -> Option<String> {
        match self.api.start_session().await {
            Ok(session) => Some(session.id),
            Err(ApiError::Conflict) => {
                // A previous crash or navigation left an open session
                // behind. One explicit clear, one retry.
                log_info!("open session conflict, clearing the stale session and retrying");
                if let Err(err) = self.api.clear_open_session().await {
                    log_warn!("failed to clear stale session: {err}");
                    return None;
                }
                match self.api.start_session().await {
                    Ok(session) => Some(session.id),
                    Err(err) => {
                        log_warn!("retry after clearing stale session failed: {err}");
                        None
                    }
                }
            }
            Err(err) => {
                log_warn!("session creation failed: {err}");
                None
            }
        }
    }

    /// Sends one state-changing update, preserving queue order: anything
    /// already queued replays first, and on any transient failure the
    /// update joins the queue instead.
    async fn send_update(&self, session_id: &str, update: SessionUpdate) {
        if is_offline_session(session_id) || !self.replay_pending().await {
            self.enqueue(session_id, update).await;
            return;
        }

        match self.api.update_session(session_id, update.clone()).await {
            Ok(_) => {}
            Err(err) if err.is_transient() => {
                log_warn!("session update queued for replay: {err}");
                self.enqueue(session_id, update).await;
            }
            Err(err) => {
                log_error!("session update rejected: {err}");
            }
        }
    }

    async fn enqueue(&self, session_id: &str, update: SessionUpdate) {
        self.pending.lock().await.push_back(PendingUpdate {
            session_id: session_id.to_string(),
            update,
            queued_at: Utc::now(),
        });
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let api = self.api.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(TICK_INTERVAL);
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            let mut ticks: u32 = 0;
            loop {
                interval.tick().await;

                let (session_id, focused_ms, paused_ms) = {
                    let mut guard = state.lock().await;
                    if guard.status != EngineStatus::Active {
                        break;
                    }
                    guard.sync_from_anchors();
                    (
                        guard.session_id.clone(),
                        guard.focused_ms,
                        guard.live_paused_ms(),
                    )
                };

                let _ = events.send(EngineEvent::Tick {
                    focused_ms,
                    paused_ms,
                });

                ticks = ticks.wrapping_add(1);
                if ticks % HEARTBEAT_EVERY_TICKS != 0 {
                    continue;
                }

                // Heartbeat: keeps the server record fresh enough that a
                // crash leaves something recoverable. Failures are
                // swallowed; the queue is reserved for state changes.
                if let Some(session_id) = session_id.filter(|id| !is_offline_session(id)) {
                    let api = api.clone();
                    let state = state.clone();
                    tokio::spawn(async move {
                        // A pause or end may have landed since this tick
                        // was sampled; a stale heartbeat would flip the
                        // server record back to active.
                        if state.lock().await.status != EngineStatus::Active {
                            return;
                        }
                        let update = SessionUpdate {
                            status: Some(SessionStatus::Active),
                            paused_duration_ms: Some(paused_ms),
                        };
                        if let Err(err) = api.update_session(&session_id, update).await {
                            log_warn!("heartbeat skipped: {err}");
                        }
                    });
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn emit_state_changed(&self) {
        let mut state = self.state.lock().await;
        state.sync_from_anchors();
        let event = EngineEvent::StateChanged {
            status: state.status,
            focused_ms: state.focused_ms,
            paused_ms: state.paused_ms,
        };
        drop(state);
        self.emit(event);
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
