//! Error types for the document store

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing the document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A blob column failed to decode as MessagePack
    #[error("corrupt blob column: {0}")]
    Corrupt(#[from] rmp_serde::decode::Error),

    /// A value failed to encode as MessagePack
    #[error("failed to encode blob column: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The referenced row does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requested transition is not valid from the row's current state
    #[error("invalid state transition on {kind} {id}: {reason}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(kind: &'static str, id: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidTransition {
            kind,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
