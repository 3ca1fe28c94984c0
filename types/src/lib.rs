//! Fundamental types for the y'alls earnings core.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! money, participant identifiers, payout identifiers and lifecycle enums, and
//! timestamps.

pub mod amount;
pub mod error;
pub mod payout;
pub mod time;
pub mod user;

pub use amount::Money;
pub use error::YallsError;
pub use payout::{PayoutGateway, PayoutId, PayoutStatus, ResidualId};
pub use time::{Clock, SystemClock, Timestamp};
pub use user::{IdempotencyKey, UserId};
