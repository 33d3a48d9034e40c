use thiserror::Error;

/// Errors surfaced by the session lifecycle core.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The owner already holds an open (active or paused) session.
    #[error("user already has an active session")]
    Conflict,

    /// No matching session for this owner. Deliberately covers the
    /// wrong-owner case too, so the existence of another user's session
    /// never leaks through an error message.
    #[error("session not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl SessionError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        SessionError::BadRequest(reason.into())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
