//! Currency amounts.
//!
//! Amounts are exact decimals (`rust_decimal::Decimal`) so that percentage
//! cascades never pick up binary floating-point error. Amounts are rounded to
//! cents only where a calculation says so; intermediates keep full precision.

use crate::error::YallsError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places in a settled currency value.
pub const CENT_SCALE: u32 = 2;

/// A currency amount in the platform's settlement currency (USD).
///
/// Serialized as a decimal string (`"12.60"`) so that every format,
/// including bincode, round-trips the exact value.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Build an amount from integer minor units (cents).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, CENT_SCALE))
    }

    /// Convert a floating-point amount, rejecting NaN and infinities.
    pub fn try_from_f64(value: f64) -> Result<Self, YallsError> {
        if !value.is_finite() {
            return Err(YallsError::InvalidAmount(format!("{value} is not finite")));
        }
        Decimal::from_f64(value)
            .map(Self)
            .ok_or_else(|| YallsError::InvalidAmount(format!("{value} is out of range")))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Round to cents, half away from zero.
    pub fn round_cents(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(CENT_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Whether the amount is settleable as-is, i.e. has no sub-cent part.
    pub fn is_whole_cents(&self) -> bool {
        self.round_cents() == *self
    }

    /// The amount in integer cents after rounding, or `None` if it does not fit.
    pub fn to_cents(&self) -> Option<i64> {
        self.round_cents()
            .0
            .checked_mul(Decimal::ONE_HUNDRED)?
            .to_i64()
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Multiply by a dimensionless rate.
    pub fn checked_mul_rate(self, rate: Decimal) -> Option<Self> {
        self.0.checked_mul(rate).map(Self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.round_cents().0;
        if rounded < Decimal::ZERO {
            write!(f, "-${:.2}", rounded.abs())
        } else {
            write!(f, "${:.2}", rounded)
        }
    }
}

impl FromStr for Money {
    type Err = YallsError;

    /// Parse a plain decimal string, optionally prefixed with `$`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('$').unwrap_or(trimmed);
        Decimal::from_str(digits)
            .map(Self)
            .map_err(|e| YallsError::InvalidAmount(format!("'{s}': {e}")))
    }
}

impl TryFrom<String> for Money {
    type Error = YallsError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Money> for String {
    fn from(m: Money) -> Self {
        m.0.to_string()
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}
