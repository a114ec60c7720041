//! Error types for the claim engine.
//!
//! Validation rejections are not errors; they are reported as
//! [`crate::tracker::Rejection`] values. The types here cover protocol
//! misuse, unavailable collaborators and bad configuration.

use thiserror::Error;

/// Session protocol errors (caller misuse or cancellation).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// `start` called while a session is not idle.
    #[error("session already active (state: {state})")]
    AlreadyTracking { state: &'static str },

    /// `ingest` called outside an active session.
    #[error("no active session (state: {state})")]
    NotTracking { state: &'static str },

    /// Persistence requested for a session that was not accepted.
    #[error("session has no accepted claim (state: {state})")]
    NotAccepted { state: &'static str },

    /// The session was cancelled while work was in flight.
    #[error("session cancelled")]
    Cancelled,

    /// Thresholds supplied to `start` are unusable.
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
}

/// Collision index errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A writer panicked while holding the index lock.
    #[error("territory index unavailable")]
    Unavailable,
}

/// External collaborator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// No answer within the bounded wait.
    #[error("collaborator did not answer within {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    /// The collaborator answered with a failure.
    #[error("collaborator failed: {0}")]
    Failed(String),

    /// The collaborator went away without answering.
    #[error("collaborator disconnected")]
    Disconnected,
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Malformed config document.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Well-formed but unusable values.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::InvalidThresholds(err.to_string())
    }
}

/// Result type for session operations.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
