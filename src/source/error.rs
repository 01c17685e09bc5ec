//! Plan source error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while fetching plan records
#[derive(Error, Debug)]
pub enum SourceError {
    /// IO error
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Plan record is not valid JSON
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No plan was captured for a capability combination
    #[error("No plan available for {0}")]
    MissingPlan(String),
}

/// Result type for plan source operations
pub type SourceResult<T> = Result<T, SourceError>;
