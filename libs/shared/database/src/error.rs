use thiserror::Error;

/// Storage-layer failures, kept distinguishable so callers can tell a
/// detected row conflict apart from transient transport trouble.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Row conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DbError {
    /// Transient failures worth retrying on read paths. Conflicts and
    /// client errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Transport(_) => true,
            DbError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
