mod session;

pub use session::{EndSessionRequest, Session, SessionPage, SessionStatus, SessionUpdate};
