//! Error types for match-arena

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Not connected to matchmaking server")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Matchmaking session closed")]
    SessionClosed,

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("API base URL not configured")]
    MissingApiBase,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid game route: {0}")]
    InvalidRoute(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MatchError {
    /// Whether a failed request is worth sending again.
    pub fn is_retryable(&self) -> bool {
        match self {
            MatchError::Http(e) => !e.is_builder() && !e.is_decode(),
            MatchError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
