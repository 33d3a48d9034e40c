pub mod engine;
pub mod state;
pub mod transport;

pub use engine::{EndOutcome, EngineEvent, PendingUpdate, TimerEngine};
pub use state::{EngineState, EngineStatus};
pub use transport::{ApiError, ApiResult, InProcessApi, SessionApi};
