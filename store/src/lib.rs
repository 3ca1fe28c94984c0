//! Abstract storage traits for the earnings core.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The service layer depends only on the traits.

pub mod error;
pub mod meta;
pub mod payout;
pub mod residual;
pub mod upline;

pub use error::StoreError;
pub use meta::MetaStore;
pub use payout::{PayoutRecord, PayoutStore};
pub use residual::{ResidualRecord, ResidualStore};
pub use upline::{DownlineMember, Referral, UplineDirectory};
