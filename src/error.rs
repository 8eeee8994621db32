use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EventError>;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("sequence conflict for aggregate {aggregate_id}: expected sequence {expected}, found {actual}")]
    SequenceConflict {
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },
    #[error("aggregate not found")]
    AggregateNotFound,
    #[error("snapshot not found")]
    SnapshotNotFound,
    #[error("read model not found")]
    ReadModelNotFound,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EventError {
    /// Conflicts and transient storage failures may succeed on retry;
    /// rejected input never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SequenceConflict { .. } | Self::Storage(_))
    }
}

impl From<toml::de::Error> for EventError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for EventError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
