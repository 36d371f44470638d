//! Error types for the framedex query engine.

use thiserror::Error;

/// Errors returned by index, cache, pagination and engine operations.
#[derive(Debug, Error)]
pub enum FramedexError {
    /// Malformed caller input: bad area, bad objects parameter, `count < 2`,
    /// inverted intervals, out-of-range coordinates.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A bounded resource (worker queue, pool) could not accept more work.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The upstream detection store could not be reached.
    #[error("Detection store unavailable: {0}")]
    StoreUnavailable(String),

    /// An internal invariant was broken. Always a bug.
    #[error("Internal invariant violated: {0}")]
    Internal(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FramedexError {
    /// Resource errors worth retrying a bounded number of times.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FramedexError::ResourceExhausted(_) | FramedexError::StoreUnavailable(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, FramedexError::InvalidInput(_))
    }
}

impl From<serde_json::Error> for FramedexError {
    fn from(err: serde_json::Error) -> Self {
        FramedexError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FramedexError>;
