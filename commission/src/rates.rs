//! Fixed commission rates.
//!
//! Rates are not configurable. Tier 2 and tier 3 are expressed relative to the
//! tier above them, not to the sale amount.

use rust_decimal::Decimal;

/// Platform fee: 5% of the sale.
pub const PLATFORM_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Direct referrer (tier 1): 10% of the sale.
pub const TIER1_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Tier 2: 20% of the tier-1 amount.
pub const TIER2_OF_TIER1: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

/// Tier 3: 30% of the tier-2 amount.
pub const TIER3_OF_TIER2: Decimal = Decimal::from_parts(30, 0, 0, false, 2);

/// Effective share of the sale credited to an upline position (1-based).
///
/// Returns `None` for positions outside 1..=3.
pub fn tier_share(position: u8) -> Option<Decimal> {
    match position {
        1 => Some(TIER1_RATE),
        2 => Some(TIER1_RATE * TIER2_OF_TIER1),
        3 => Some(TIER1_RATE * TIER2_OF_TIER1 * TIER3_OF_TIER2),
        _ => None,
    }
}
