//! Parse and validation errors for the shared types.

use thiserror::Error;

/// Errors raised while constructing or parsing a shared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YallsError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    #[error("invalid record id: {0}")]
    InvalidRecordId(String),

    #[error("unknown payout status: {0}")]
    InvalidStatus(String),

    #[error("unknown payout gateway: {0}")]
    InvalidGateway(String),
}
