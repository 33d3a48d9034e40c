//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Chatty paths (the timer tick, heartbeats) log through these so a module
//! can silence itself wholesale with one const:
//!
//! ```rust
//! const ENABLE_LOGS: bool = true;
//!
//! use studypulse::log_warn;
//! # fn main() {
//! log_warn!("heartbeat skipped");
//! # }
//! ```

/// Info-level logging, active only when the calling module defines
/// `const ENABLE_LOGS: bool = true`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level counterpart of [`log_info!`].
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
