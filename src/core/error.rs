//! Failure taxonomy for acquisition and storage

use thiserror::Error;

/// The page could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderFailure {
    #[error("Timed out waiting for {url} to render")]
    Timeout { url: String },
    #[error("Blocked by an anti-bot challenge at {url}")]
    Blocked { url: String },
    #[error("Navigation to {url} failed: {reason}")]
    NavigationError { url: String, reason: String },
}

/// The rendered page did not yield flow records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("No flow table with known {asset_class} ticker headers found; the page layout may have changed")]
    TableNotFound { asset_class: String },
    #[error("Flow table for {asset_class} contained no dated rows")]
    EmptyTable { asset_class: String },
    #[error("Row {row}: {reason}")]
    RowParseError { row: usize, reason: String },
}

/// One render+extract attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Render(#[from] RenderFailure),
    #[error(transparent)]
    Parse(#[from] ParseFailure),
}

impl AcquireError {
    /// Failures that indicate the source changed shape and need a human.
    pub fn needs_attention(&self) -> bool {
        matches!(self, AcquireError::Parse(ParseFailure::TableNotFound { .. }))
    }
}

#[derive(Debug, Error)]
pub enum StoreFailure {
    #[error("Failed to open flow store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Failed to create data directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Corrupt record for {asset_class} on {date}: {reason}")]
    Corrupt {
        asset_class: String,
        date: String,
        reason: String,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
