//! Shared error taxonomy for document collaboration.
//!
//! Four classes cover every failure path in the workspace:
//! - `Unauthorized` — permission denial, caught at the input layer
//! - `NotFound` — a record, account or blob that doesn't exist
//! - `Transient` — store/network/persistence unreachable; no retry
//! - `Validation` — bad input, silently skipped or surfaced as a notice
//!
//! No error is fatal to the process; every failure path returns the
//! caller to its prior stable state.

/// Collaboration-layer error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    /// Acting principal lacks permission for the operation
    Unauthorized(String),
    /// Referenced entity does not exist
    NotFound(String),
    /// Backend temporarily unreachable (store, persistence, blob I/O)
    Transient(String),
    /// Input rejected before any side effect
    Validation(String),
}

impl std::fmt::Display for CollabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollabError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            CollabError::NotFound(what) => write!(f, "Not found: {what}"),
            CollabError::Transient(msg) => write!(f, "Transient failure: {msg}"),
            CollabError::Validation(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for CollabError {}

impl CollabError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Only transient failures qualify; the design still never retries
    /// automatically — the next user action schedules a fresh attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CollabError::Transient(_))
    }
}
