//! Commission-specific errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommissionError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid upline chain: {reason}")]
    InvalidUplineChain { reason: String },

    #[error("unknown rank: {0}")]
    UnknownRank(String),

    #[error("arithmetic overflow in commission computation")]
    Overflow,
}
