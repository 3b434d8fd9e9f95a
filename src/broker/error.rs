//! Error types for the message broker

use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("message payload corrupt: {0}")]
    Corrupt(#[from] rmp_serde::decode::Error),

    #[error("failed to encode message payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("message {0} not found (already claimed or acked elsewhere)")]
    NotFound(uuid::Uuid),
}

impl BrokerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
