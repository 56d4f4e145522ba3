use std::sync::Arc;

use thiserror::Error;

/// Failures of the HTTP collaborator.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Reqwest(Arc<reqwest::Error>),

    #[error("response decode failed: {0}")]
    Decode(String),
}

/// Session layer error types
///
/// The type is `Clone` because a single refresh outcome is handed to every
/// caller waiting on the shared refresh ticket.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("JSON serialization error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("API error (code={code}): {message}")]
    Api { code: i64, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid access token: {0}")]
    InvalidAccessToken(String),
}

impl SessionError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::Http(HttpError::Reqwest(_))
                | SessionError::Connection(_)
                | SessionError::Timeout(_)
        )
    }

    /// Whether the error requires the user to go through an explicit login.
    pub fn is_auth(&self) -> bool {
        matches!(self, SessionError::Auth(_))
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Http(HttpError::Reqwest(Arc::new(e)))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Json(Arc::new(e))
    }
}
