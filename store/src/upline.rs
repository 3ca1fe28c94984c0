//! Referral graph lookups.

use std::collections::{HashSet, VecDeque};

use crate::StoreError;
use serde::{Deserialize, Serialize};
use yalls_types::{Timestamp, UserId};

/// A direct referrer link, recorded once at enrolment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub user: UserId,
    pub referrer: UserId,
    pub enrolled_at: Timestamp,
}

/// A member found below some root in the referral tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlineMember {
    pub user_id: UserId,
    /// 1 for a direct referral of the root.
    pub level_depth: u32,
    /// Ids from the root's direct referral down to this member, inclusive.
    pub referral_path: Vec<UserId>,
}

/// Directory of direct referrer links.
///
/// Each user has at most one referrer, set once at enrolment.
pub trait UplineDirectory {
    /// Record the direct referrer of `referral.user`.
    ///
    /// Fails with [`StoreError::Duplicate`] if the user already has one.
    fn set_referrer(&self, referral: &Referral) -> Result<(), StoreError>;

    /// The direct referrer of `user`, if any.
    fn referrer_of(&self, user: &UserId) -> Result<Option<UserId>, StoreError>;

    /// Members `referrer` enrolled directly, most recent enrolment first.
    fn direct_referrals(&self, referrer: &UserId) -> Result<Vec<Referral>, StoreError>;

    /// Walk referrer links up to `max_depth` levels, nearest first.
    ///
    /// Cycles are not broken here; a repeated id shows up in the result and is
    /// rejected by chain validation.
    fn upline_chain(&self, user: &UserId, max_depth: usize) -> Result<Vec<UserId>, StoreError> {
        let mut chain = Vec::with_capacity(max_depth);
        let mut current = user.clone();
        while chain.len() < max_depth {
            match self.referrer_of(&current)? {
                Some(referrer) => {
                    chain.push(referrer.clone());
                    current = referrer;
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Everyone below `root` down to `max_depth` levels, level by level.
    ///
    /// Within a level, members follow their parent's position and then
    /// enrolment order, newest first. Each member is reported once.
    fn downline(&self, root: &UserId, max_depth: u32) -> Result<Vec<DownlineMember>, StoreError> {
        let mut members = Vec::new();
        let mut seen = HashSet::from([root.clone()]);
        let mut frontier = VecDeque::from([(root.clone(), Vec::new())]);

        while let Some((parent, path)) = frontier.pop_front() {
            let depth = path.len() as u32 + 1;
            if depth > max_depth {
                continue;
            }
            for referral in self.direct_referrals(&parent)? {
                if !seen.insert(referral.user.clone()) {
                    continue;
                }
                let mut referral_path: Vec<UserId> = path.clone();
                referral_path.push(referral.user.clone());
                members.push(DownlineMember {
                    user_id: referral.user.clone(),
                    level_depth: depth,
                    referral_path: referral_path.clone(),
                });
                frontier.push_back((referral.user, referral_path));
            }
        }
        Ok(members)
    }
}
