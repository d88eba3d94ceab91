//! Cloud provider error types

use thiserror::Error;

/// Cloud operation errors
///
/// `RateLimited`, `NotFound`, `Unauthorized` and `Conflict` are the sentinel
/// categories every provider maps its failures onto. Everything else a
/// provider reports should become `Network` (transient) or `Api`.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("{count} consecutive failures while polling: {last}")]
    ConsecutiveFailures { count: u32, last: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not supported by provider: {0}")]
    Unsupported(String),

    #[error("Action store error: {0}")]
    Store(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CloudError::RateLimited(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CloudError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
