//! Five-way commission split of a single sale.

use crate::chain::UplineChain;
use crate::error::CommissionError;
use crate::rates::{PLATFORM_RATE, TIER1_RATE, TIER2_OF_TIER1, TIER3_OF_TIER2};
use serde::{Deserialize, Serialize};
use yalls_types::{Money, UserId};

/// A sale to be split between the seller, their upline and the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub user_id: UserId,
    pub amount: Money,
    pub upline_chain: UplineChain,
}

impl Transaction {
    pub fn new(user_id: UserId, amount: Money, upline_chain: UplineChain) -> Self {
        Self {
            user_id,
            amount,
            upline_chain,
        }
    }

    pub fn split(&self) -> Result<CommissionSplit, CommissionError> {
        split_commission(self.amount, &self.upline_chain)
    }
}

/// Result of splitting one sale. Every field except `total` is rounded to cents.
///
/// `upline2` and `upline3` are carved out of the upline pool, not out of the
/// sale: only `user + upline1 + platform` approximates `total`, within the
/// rounding slack of independently rounded fields (at most two cents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub user: Money,
    pub upline1: Money,
    pub upline2: Money,
    pub upline3: Money,
    pub platform: Money,
    /// The original sale amount, echoed back unrounded.
    pub total: Money,
}

impl CommissionSplit {
    /// Amount credited to a 1-based tier position.
    pub fn tier_amount(&self, tier: u8) -> Option<Money> {
        match tier {
            1 => Some(self.upline1),
            2 => Some(self.upline2),
            3 => Some(self.upline3),
            _ => None,
        }
    }
}

/// Compute the split of `amount`.
///
/// The tier cascade is computed from unrounded intermediates and each field
/// is rounded on its own afterwards. Amounts for tiers 2 and 3 are produced
/// even when the chain is shorter; see [`attribute_split`] for crediting
/// actual accounts.
pub fn split_commission(
    amount: Money,
    chain: &UplineChain,
) -> Result<CommissionSplit, CommissionError> {
    if amount.is_negative() {
        return Err(CommissionError::InvalidAmount(format!(
            "sale amount {} is negative",
            amount.value()
        )));
    }

    let platform = amount
        .checked_mul_rate(PLATFORM_RATE)
        .ok_or(CommissionError::Overflow)?;
    let upline1 = amount
        .checked_mul_rate(TIER1_RATE)
        .ok_or(CommissionError::Overflow)?;
    let upline2 = upline1
        .checked_mul_rate(TIER2_OF_TIER1)
        .ok_or(CommissionError::Overflow)?;
    let upline3 = upline2
        .checked_mul_rate(TIER3_OF_TIER2)
        .ok_or(CommissionError::Overflow)?;
    let user = amount
        .checked_sub(upline1)
        .and_then(|rest| rest.checked_sub(platform))
        .ok_or(CommissionError::Overflow)?;

    tracing::trace!(
        amount = %amount.value(),
        tiers_present = chain.len(),
        "split commission"
    );

    Ok(CommissionSplit {
        user: user.round_cents(),
        upline1: upline1.round_cents(),
        upline2: upline2.round_cents(),
        upline3: upline3.round_cents(),
        platform: platform.round_cents(),
        total: amount,
    })
}

/// A split amount credited to a concrete upline account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionCredit {
    pub earner: UserId,
    pub tier: u8,
    pub amount: Money,
}

/// Credit each present chain position with its tier's amount.
///
/// Tiers without a referrer in the chain produce no credit.
pub fn attribute_split(split: &CommissionSplit, chain: &UplineChain) -> Vec<CommissionCredit> {
    chain
        .iter()
        .zip(1u8..)
        .filter_map(|(earner, tier)| {
            split.tier_amount(tier).map(|amount| CommissionCredit {
                earner: earner.clone(),
                tier,
                amount,
            })
        })
        .collect()
}
