use thiserror::Error;

use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    #[error("Store I/O error: {0}")]
    Store(#[from] tokio_rusqlite::Error),

    #[error("Unsupported schema version {found} (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("Table {table} has no index on {field}")]
    UnknownIndex { table: &'static str, field: String },

    #[error("Invalid {table} row: {reason}")]
    InvalidEntity { table: &'static str, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No credential will become available (token source closed)")]
    TokenUnavailable,

    #[error("Store context has not been created")]
    ContextNotInitialized,

    #[error("Store context was already created")]
    ContextAlreadyInitialized,

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
