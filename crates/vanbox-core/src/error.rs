//! Error types for vanbox-core

use thiserror::Error;

use crate::auth::AuthError;

/// Result type alias for entry store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by an entry store adapter
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure (connection refused, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("Store API error: {message} ({status})")]
    Api { status: u16, message: String },

    /// The store answered with a payload we could not decode
    #[error("Failed to decode store payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The store cannot be reached at all (offline double, missing backend)
    #[error("Entry store unavailable: {0}")]
    Unavailable(String),

    /// Misconfigured adapter
    #[error("Invalid store configuration: {0}")]
    InvalidConfiguration(String),
}

/// Draft content rejected before any store call
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentError {
    /// Trimmed content is empty
    #[error("Note content cannot be empty")]
    Empty,

    /// Content exceeds the character limit
    #[error("Note is too long ({len} / {max} characters)")]
    TooLong { len: usize, max: usize },
}

/// Why a controller operation did not complete
#[derive(Error, Debug)]
pub enum OperationError {
    /// Precondition on the draft failed
    #[error(transparent)]
    Validation(#[from] ContentError),

    /// The operation needs an authenticated session
    #[error("No user is signed in")]
    NotSignedIn,

    /// Confirmation arrived without an open delete prompt
    #[error("No delete is awaiting confirmation")]
    NoPendingDelete,

    /// Transport or store-side failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store accepted the delete but removed no rows, which is how
    /// row-level authorization reports a denied delete.
    #[error("Deletion failed. Please check permissions or try again.")]
    NothingDeleted,

    /// Session provider failure
    #[error(transparent)]
    Auth(#[from] AuthError),
}
