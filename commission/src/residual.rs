//! Residual earnings over a member's downline history.

use crate::error::CommissionError;
use crate::rates::tier_share;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use yalls_types::Money;

/// One downline sale, tagged with the upline position the earner held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlineTransaction {
    pub amount: Money,
    /// 1 = direct referrer, 2 and 3 further up. Other values earn nothing.
    pub upline_position: u8,
}

impl DownlineTransaction {
    pub fn new(amount: Money, upline_position: u8) -> Self {
        Self {
            amount,
            upline_position,
        }
    }
}

/// Total residual earnings, rounded to cents once at the end.
///
/// Entries with a position outside 1..=3 are skipped. Summation is exact, so
/// many small sales do not accumulate per-entry rounding error. A total that
/// leaves the `Decimal` range is reported as [`CommissionError::Overflow`].
pub fn aggregate_residuals<'a, I>(entries: I) -> Result<Money, CommissionError>
where
    I: IntoIterator<Item = &'a DownlineTransaction>,
{
    let mut total = Decimal::ZERO;
    let mut skipped = 0usize;
    for entry in entries {
        match tier_share(entry.upline_position) {
            Some(share) => {
                total = entry
                    .amount
                    .value()
                    .checked_mul(share)
                    .and_then(|earned| total.checked_add(earned))
                    .ok_or(CommissionError::Overflow)?;
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "ignored residual entries with unknown upline position");
    }
    Ok(Money::new(total).round_cents())
}
