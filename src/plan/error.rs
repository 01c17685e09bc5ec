//! Plan parsing error types

use thiserror::Error;

/// Errors raised while turning a plan record into a [`PlanTree`](super::PlanTree)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// The record is missing a mandatory field or has the wrong shape
    #[error("Malformed plan record: {0}")]
    Format(String),

    /// The plan could not be located inside its envelope
    #[error("No plan found in envelope: {0}")]
    Envelope(String),
}

/// Result type for plan operations
pub type PlanResult<T> = Result<T, PlanError>;
