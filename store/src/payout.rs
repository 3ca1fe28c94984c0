//! Payout record storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use yalls_types::{IdempotencyKey, Money, PayoutGateway, PayoutId, PayoutStatus, Timestamp, UserId};

/// A requested transfer of residual earnings to an external payment rail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub id: PayoutId,
    pub user_id: UserId,
    pub amount: Money,
    pub status: PayoutStatus,
    pub gateway: PayoutGateway,
    pub created_at: Timestamp,
    /// Client token the record was created under, if any.
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl PayoutRecord {
    /// A freshly requested payout.
    pub fn pending(
        user_id: UserId,
        amount: Money,
        gateway: PayoutGateway,
        created_at: Timestamp,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Self {
        Self {
            id: PayoutId::generate(),
            user_id,
            amount,
            status: PayoutStatus::Pending,
            gateway,
            created_at,
            idempotency_key,
        }
    }
}

/// Trait for payout record storage.
///
/// Inserts are idempotent: writing a record whose id already exists, or whose
/// `(user_id, idempotency_key)` pair was already used, returns the stored
/// record and writes nothing.
pub trait PayoutStore {
    /// Durably insert a payout record; returns the record as committed.
    fn insert_payout(&self, record: &PayoutRecord) -> Result<PayoutRecord, StoreError>;

    /// Retrieve a payout by id.
    fn get_payout(&self, id: &PayoutId) -> Result<PayoutRecord, StoreError>;

    /// All payouts for a user, newest first.
    fn payouts_for_user(&self, user: &UserId) -> Result<Vec<PayoutRecord>, StoreError>;

    /// Move a payout to `status`.
    ///
    /// Fails with [`StoreError::Conflict`] when the current status does not
    /// allow the transition.
    fn update_payout_status(
        &self,
        id: &PayoutId,
        status: PayoutStatus,
    ) -> Result<PayoutRecord, StoreError>;

    /// Total number of payout records.
    fn payout_count(&self) -> Result<u64, StoreError>;
}

/// Shared transition check for backends.
pub fn check_transition(record: &PayoutRecord, next: PayoutStatus) -> Result<(), StoreError> {
    if record.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "payout {} cannot move from {} to {}",
            record.id, record.status, next
        )))
    }
}
