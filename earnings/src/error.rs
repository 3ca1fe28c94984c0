use thiserror::Error;

use yalls_commission::CommissionError;
use yalls_store::StoreError;
use yalls_types::{Money, PayoutId, PayoutStatus};

#[derive(Debug, Error)]
pub enum EarningsError {
    #[error("commission error: {0}")]
    Commission(#[from] CommissionError),

    #[error("payout amount must be a positive whole number of cents, got {0}")]
    InvalidPayoutAmount(Money),

    #[error("payout {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        id: PayoutId,
        from: PayoutStatus,
        to: PayoutStatus,
    },

    #[error("invalid referral: {0}")]
    InvalidReferral(String),

    #[error("store error: {0}")]
    Persistence(#[from] StoreError),

    #[error("store did not respond after {attempts} attempts")]
    PersistenceTimeout { attempts: u32 },

    #[error("store task failed: {0}")]
    Task(String),
}
