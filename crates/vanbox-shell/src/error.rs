//! Error types for vanbox-shell

use http::StatusCode;
use thiserror::Error;

use crate::worker::WorkerState;

/// Result type alias for shell cache operations
pub type ShellResult<T> = std::result::Result<T, ShellError>;

/// Errors raised while installing the shell or answering a fetch
#[derive(Error, Debug)]
pub enum ShellError {
    /// Transport-level failure talking to the origin
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A precache path answered with a non-success status
    #[error("Failed to precache {path}: status {status}")]
    BadStatus { path: String, status: StatusCode },

    /// No network at all
    #[error("Network unavailable: {0}")]
    Offline(String),

    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Lifecycle step requested from the wrong state
    #[error("Cannot {action} a worker that is {state:?}")]
    InvalidState {
        state: WorkerState,
        action: &'static str,
    },
}
