//! The reconciliation/sync protocol seam between the client timer engine
//! and the lifecycle controller: an abstract RPC surface plus the error
//! taxonomy crossing it.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    error::SessionError,
    lifecycle::LifecycleController,
    models::{EndSessionRequest, Session, SessionPage, SessionUpdate},
};

/// Errors crossing the client/server boundary. `Transport` is the one
/// transient class: the engine queues and replays around it, and it is the
/// only variant that never reflects a server-side decision.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("user already has an active session")]
    Conflict,
    #[error("session not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("network failure: {0}")]
    Transport(String),
}

impl ApiError {
    /// Transient failures are retried via the offline queue; everything
    /// else is a definitive server answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Conflict => ApiError::Conflict,
            SessionError::NotFound => ApiError::NotFound,
            SessionError::BadRequest(reason) => ApiError::BadRequest(reason),
            SessionError::Storage(err) => ApiError::Transport(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The client-facing operation surface. Implementations carry the caller's
/// already-verified identity; the engine never sees an owner id.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn start_session(&self) -> ApiResult<Session>;
    async fn update_session(&self, session_id: &str, update: SessionUpdate)
        -> ApiResult<Session>;
    async fn end_session(
        &self,
        session_id: &str,
        request: EndSessionRequest,
    ) -> ApiResult<Session>;
    async fn get_session(&self, session_id: &str) -> ApiResult<Session>;
    async fn list_sessions(&self, page: u64, page_size: u64) -> ApiResult<SessionPage>;
    async fn discard_session(&self, session_id: &str) -> ApiResult<()>;
    async fn clear_open_session(&self) -> ApiResult<()>;
}

/// Binds the RPC surface directly to an in-process controller on behalf of
/// one owner. The wire transport a deployment would add sits behind the
/// same trait.
#[derive(Clone)]
pub struct InProcessApi {
    controller: LifecycleController,
    owner_id: String,
}

impl InProcessApi {
    pub fn new(controller: LifecycleController, owner_id: impl Into<String>) -> Self {
        Self {
            controller,
            owner_id: owner_id.into(),
        }
    }
}

#[async_trait]
impl SessionApi for InProcessApi {
    async fn start_session(&self) -> ApiResult<Session> {
        Ok(self.controller.start(&self.owner_id).await?)
    }

    async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> ApiResult<Session> {
        Ok(self
            .controller
            .set_status(session_id, &self.owner_id, update)
            .await?)
    }

    async fn end_session(
        &self,
        session_id: &str,
        request: EndSessionRequest,
    ) -> ApiResult<Session> {
        Ok(self
            .controller
            .end(session_id, &self.owner_id, request)
            .await?)
    }

    async fn get_session(&self, session_id: &str) -> ApiResult<Session> {
        Ok(self
            .controller
            .get_session(session_id, &self.owner_id)
            .await?)
    }

    async fn list_sessions(&self, page: u64, page_size: u64) -> ApiResult<SessionPage> {
        Ok(self
            .controller
            .list_sessions(&self.owner_id, page, page_size)
            .await?)
    }

    async fn discard_session(&self, session_id: &str) -> ApiResult<()> {
        Ok(self
            .controller
            .discard(session_id, &self.owner_id)
            .await?)
    }

    async fn clear_open_session(&self) -> ApiResult<()> {
        Ok(self.controller.clear_open_session(&self.owner_id).await?)
    }
}
