//! Residual ledger storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use yalls_types::{Money, ResidualId, Timestamp, UserId};

/// One upline's share of one downline sale.
///
/// `amount` is the sale amount; the earner's commission is derived from it
/// and `upline_position` when residuals are aggregated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualRecord {
    pub id: ResidualId,
    pub earner: UserId,
    pub source: UserId,
    pub amount: Money,
    pub upline_position: u8,
    pub created_at: Timestamp,
}

/// Trait for the residual-eligible transaction ledger.
pub trait ResidualStore {
    /// Insert a batch of records atomically. Re-inserting a record with the
    /// same id and earner overwrites it with identical content.
    fn put_residuals(&self, records: &[ResidualRecord]) -> Result<(), StoreError>;

    /// All records earned by `earner`, oldest first.
    fn residuals_for_user(&self, earner: &UserId) -> Result<Vec<ResidualRecord>, StoreError>;

    /// Records earned by `earner`, newest first, at most `limit` of them.
    fn recent_residuals(
        &self,
        earner: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<ResidualRecord>, StoreError> {
        let mut records = self.residuals_for_user(earner)?;
        records.reverse();
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
