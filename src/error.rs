use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiFixError {
    #[error("API request failed (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("GitHub rejected the credentials (status {status}); set GITHUB_TOKEN to a token with `actions:read` and `contents:read`")]
    Auth { status: u16 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Git command `{command}` failed: {stderr}")]
    Vcs { command: String, stderr: String },

    #[error("No terminal run for commit {commit} after {}s", elapsed.as_secs())]
    PollTimeout { commit: String, elapsed: Duration },

    #[error("Failed to extract build errors: {0}")]
    Extraction(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CiFixError {
    /// Whether the failure may clear up on its own and is worth another poll.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) | Self::Json(_) | Self::PollTimeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CiFixError>;
