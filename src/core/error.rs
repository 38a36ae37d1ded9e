/// Error types for each layer of the service.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database file {} not found", .0.display())]
    DatabaseMissing(PathBuf),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    TaskFailed(String),
}

/// Failures of the REST API as seen by the MCP tools.
#[derive(Error, Debug)]
pub enum ApiClientError {
    /// Non-2xx response; `message` is already extracted from the body.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    /// 2xx response carrying `resultCd: false`.
    #[error("{0}")]
    Business(String),
}
