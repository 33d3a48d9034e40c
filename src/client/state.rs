//! Local timer state, driven purely by the monotonic clock.
//!
//! The displayed clock never depends on a network round-trip: elapsed time
//! is derived from an `Instant` anchor taken at start, pause accounting from
//! a second anchor taken when the session pauses. `tokio::time::Instant`
//! keeps the math monotonic and lets tests drive it with paused time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    Idle,
    Active,
    Paused,
    Completed,
}

impl Default for EngineStatus {
    fn default() -> Self {
        EngineStatus::Idle
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub status: EngineStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Sum of completed pause intervals.
    pub paused_ms: u64,
    /// Focused time as of the last `sync_from_anchors` call.
    pub focused_ms: u64,
    #[serde(skip)]
    start_anchor: Option<Instant>,
    #[serde(skip)]
    pause_anchor: Option<Instant>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, started_at: DateTime<Utc>, now: Instant) {
        *self = Self {
            status: EngineStatus::Active,
            session_id: None,
            started_at: Some(started_at),
            paused_ms: 0,
            focused_ms: 0,
            start_anchor: Some(now),
            pause_anchor: None,
        };
    }

    /// Wall-clock milliseconds since start, paused or not.
    pub fn elapsed_ms(&self) -> u64 {
        match self.start_anchor {
            Some(anchor) => anchor.elapsed().as_millis() as u64,
            None => self.focused_ms + self.paused_ms,
        }
    }

    /// Accumulated pause time including the live in-progress interval.
    /// The live part is display-only until the pause completes.
    pub fn live_paused_ms(&self) -> u64 {
        let in_progress = self
            .pause_anchor
            .map(|anchor| anchor.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.paused_ms.saturating_add(in_progress)
    }

    /// Focused time right now, derived from the anchors.
    pub fn current_focused_ms(&self) -> u64 {
        match self.start_anchor {
            Some(_) => self.elapsed_ms().saturating_sub(self.live_paused_ms()),
            None => self.focused_ms,
        }
    }

    /// Folds the anchors into the stored focused total.
    pub fn sync_from_anchors(&mut self) {
        if self.start_anchor.is_some() {
            self.focused_ms = self.current_focused_ms();
        }
    }

    /// Marks the start of a pause interval.
    pub fn pause(&mut self, now: Instant) {
        self.sync_from_anchors();
        self.status = EngineStatus::Paused;
        self.pause_anchor = Some(now);
    }

    /// Ends the in-progress pause interval and returns its length.
    pub fn resume(&mut self) -> u64 {
        let interval = self
            .pause_anchor
            .take()
            .map(|anchor| anchor.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.paused_ms = self.paused_ms.saturating_add(interval);
        self.status = EngineStatus::Active;
        self.sync_from_anchors();
        interval
    }

    /// Terminal local transition: folds in any live pause interval and
    /// freezes the totals. Returns `(focused_ms, paused_ms)`.
    pub fn finalize(&mut self) -> (u64, u64) {
        if self.pause_anchor.is_some() {
            self.resume();
        }
        self.sync_from_anchors();
        self.status = EngineStatus::Completed;
        self.start_anchor = None;
        (self.focused_ms, self.paused_ms)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Ids minted locally when the server could not create the session.
pub fn is_offline_session(session_id: &str) -> bool {
    session_id.starts_with("offline_")
}
