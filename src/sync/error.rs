use thiserror::Error;

use crate::error::AppError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid sync endpoint {0}")]
    InvalidEndpoint(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("failed to apply {table} row {key}: {reason}")]
    Apply {
        table: &'static str,
        key: String,
        reason: String,
    },

    #[error("local store error: {0}")]
    Store(Box<AppError>),

    #[error("token source closed")]
    TokenUnavailable,

    #[error("sync engine has been disconnected")]
    Disconnected,
}

impl SyncError {
    /// Network failures and server-side hiccups that are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

impl From<AppError> for SyncError {
    fn from(err: AppError) -> Self {
        SyncError::Store(Box::new(err))
    }
}
