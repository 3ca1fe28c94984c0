//! Commission engine for the y'alls referral program.
//!
//! Everything in this crate is a pure function of its inputs:
//! - Five-way split of a sale across the seller, three upline tiers and the platform
//! - Upline chain validation
//! - Residual aggregation over a member's downline history
//! - Rank progress against the rank requirement table
//! - Referral codes and links
//!
//! Resolving *who* sits in a member's upline is the caller's job; see
//! `yalls_store::UplineDirectory`.

pub mod chain;
pub mod error;
pub mod rank;
pub mod rates;
pub mod referral;
pub mod residual;
pub mod split;

pub use chain::{is_valid_upline_chain, UplineChain, MAX_UPLINE_DEPTH};
pub use error::CommissionError;
pub use rank::{rank_progress, MemberStats, Rank, RankProgress, RankRequirement, RequirementsMet};
pub use referral::{referral_code, referral_link};
pub use residual::{aggregate_residuals, DownlineTransaction};
pub use split::{attribute_split, split_commission, CommissionCredit, CommissionSplit, Transaction};
