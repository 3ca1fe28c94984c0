//! Persistence-backed earnings operations.
//!
//! [`EarningsService`] owns the payout request flow and sale recording. It
//! talks to storage only through the `yalls-store` traits and runs every
//! store call on the blocking pool under a timeout, retrying transient
//! failures with exponential backoff.

pub mod config;
pub mod error;
pub mod retry;
pub mod service;

pub use config::EarningsConfig;
pub use error::EarningsError;
pub use retry::{Backoff, RetryPolicy};
pub use service::{
    counters, CommissionEntry, EarningsService, PayoutRequest, SaleReceipt, Stores,
    DEFAULT_TREE_DEPTH,
};
