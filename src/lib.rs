//! Study-session lifecycle core.
//!
//! Tracks timed study sessions with pause/resume, reconciling a locally
//! ticking client timer against a server-held authoritative record. The
//! server side enforces one open session per owner and owns the final
//! duration arithmetic; the client side keeps the displayed clock
//! independent of network health, queueing updates it could not deliver
//! and replaying them in order.
//!
//! Identity verification, durable storage engines beyond the bundled
//! SQLite layer, and the advice generator itself are external
//! collaborators reached through the trait seams in [`client`] and
//! [`stats`].

pub mod client;
pub mod duration;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod stats;
pub mod store;
pub mod utils;

pub use client::{
    ApiError, ApiResult, EndOutcome, EngineEvent, EngineState, EngineStatus, InProcessApi,
    PendingUpdate, SessionApi, TimerEngine,
};
pub use error::{SessionError, SessionResult};
pub use lifecycle::{LifecycleController, DEFAULT_PAGE_SIZE};
pub use models::{EndSessionRequest, Session, SessionPage, SessionStatus, SessionUpdate};
pub use stats::{AdviceGenerator, StudyStatistics};
pub use store::{Database, OpenSession, SessionStore};
