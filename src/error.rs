use thiserror::Error;

/// Every failure the reconciler and its clients can report.
///
/// None of these are fatal: callers keep the draft and may retry.
#[derive(Debug, Error)]
pub enum TailorError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("An AI request is still in progress")]
    AiPending,
}

impl TailorError {
    /// Transport and 5xx failures may succeed on retry without user changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            TailorError::Transport(_) => true,
            TailorError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TailorError>;

/// Trim and check a user-supplied resume name.
pub fn validate_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TailorError::Validation(
            "Resume name cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
