//! Upline chain validation.

use crate::error::CommissionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use yalls_types::UserId;

/// Number of upline tiers that earn commission.
pub const MAX_UPLINE_DEPTH: usize = 3;

/// Basic shape check: at most three entries, none of them empty.
///
/// Does not look for duplicates or self-references; use
/// [`UplineChain::for_user`] when the transacting user is known.
pub fn is_valid_upline_chain<S: AsRef<str>>(ids: &[S]) -> bool {
    ids.len() <= MAX_UPLINE_DEPTH && ids.iter().all(|id| !id.as_ref().is_empty())
}

/// A validated referral chain, nearest referrer first.
///
/// Holds at most [`MAX_UPLINE_DEPTH`] distinct ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplineChain(Vec<UserId>);

impl UplineChain {
    /// A chain with no referrers.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Validate a chain without knowing who is transacting.
    pub fn new(ids: Vec<UserId>) -> Result<Self, CommissionError> {
        if ids.len() > MAX_UPLINE_DEPTH {
            return Err(CommissionError::InvalidUplineChain {
                reason: format!(
                    "chain has {} entries, at most {} allowed",
                    ids.len(),
                    MAX_UPLINE_DEPTH
                ),
            });
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id.as_str()) {
                return Err(CommissionError::InvalidUplineChain {
                    reason: format!("{id} appears more than once"),
                });
            }
        }
        Ok(Self(ids))
    }

    /// Validate a chain for a sale by `user`, which must not appear in it.
    pub fn for_user(user: &UserId, ids: Vec<UserId>) -> Result<Self, CommissionError> {
        if ids.contains(user) {
            return Err(CommissionError::InvalidUplineChain {
                reason: format!("{user} is listed in their own upline"),
            });
        }
        Self::new(ids)
    }

    /// Parse raw identifiers, rejecting empty strings.
    pub fn parse<S: AsRef<str>>(ids: &[S]) -> Result<Self, CommissionError> {
        if !is_valid_upline_chain(ids) {
            return Err(CommissionError::InvalidUplineChain {
                reason: format!(
                    "expected at most {} non-empty ids, got {}",
                    MAX_UPLINE_DEPTH,
                    ids.len()
                ),
            });
        }
        let parsed = ids
            .iter()
            .map(|id| {
                UserId::new(id.as_ref()).map_err(|e| CommissionError::InvalidUplineChain {
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parsed)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.0.iter()
    }
}
