//! Errors surfaced by the sync layer.

use thiserror::Error;

use crate::infrastructure::StoreError;

/// Errors reported by engine operations, listeners and the contact directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The record is not in the local snapshot, or the store no longer has it.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record (`"task"`, `"subtask"`, `"contact"`).
        entity: &'static str,
        /// Id of the missing record.
        id: String,
    },

    /// The store rejected or failed the write.
    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(StoreError),

    /// The input cannot be written as given.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Today's quota of external submissions is used up.
    #[error("Daily limit of {limit} submissions reached")]
    DailyLimitReached {
        /// Submissions allowed per day.
        limit: u32,
    },

    /// A collection subscription failed; its snapshot was cleared.
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(StoreError),

    /// The background task carrying the operation panicked or was aborted.
    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

impl EngineError {
    /// Creates a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Maps a store error from a write on `entity`/`id`.
    ///
    /// A store `NotFound` becomes an engine `NotFound`; anything else is a
    /// failed remote write.
    pub fn from_write(entity: &'static str, id: impl std::fmt::Display, error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => Self::not_found(entity, id),
            other => Self::RemoteWriteFailed(other),
        }
    }
}
