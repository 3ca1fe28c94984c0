//! Member rank ladder and progress toward the next rank.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use yalls_types::UserId;

use crate::error::CommissionError;

/// Rank ladder, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Unranked,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Executive,
}

impl Rank {
    pub const LADDER: [Rank; 7] = [
        Self::Unranked,
        Self::Bronze,
        Self::Silver,
        Self::Gold,
        Self::Platinum,
        Self::Diamond,
        Self::Executive,
    ];

    /// The rank above this one, or `None` at the top.
    pub fn next(&self) -> Option<Rank> {
        let idx = Self::LADDER.iter().position(|r| r == self)?;
        Self::LADDER.get(idx + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unranked => "unranked",
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
            Self::Diamond => "diamond",
            Self::Executive => "executive",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = CommissionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::LADDER
            .into_iter()
            .find(|rank| rank.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CommissionError::UnknownRank(s.to_string()))
    }
}

/// Minimums a member must reach to hold `rank`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRequirement {
    pub rank: Rank,
    pub min_personal_volume_cents: i64,
    pub min_team_volume_cents: i64,
    pub min_direct_referrals: u32,
    pub min_active_downline: u32,
    pub monthly_bonus_cents: i64,
}

/// A member's current standing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStats {
    pub user_id: UserId,
    pub current_rank: Rank,
    pub personal_volume_cents: i64,
    pub team_volume_cents: i64,
    pub direct_referrals: u32,
    pub active_downline: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsMet {
    pub personal_volume: bool,
    pub team_volume: bool,
    pub direct_referrals: bool,
    pub active_downline: bool,
}

impl RequirementsMet {
    const ALL_MET: Self = Self {
        personal_volume: true,
        team_volume: true,
        direct_referrals: true,
        active_downline: true,
    };

    fn count(&self) -> u8 {
        [
            self.personal_volume,
            self.team_volume,
            self.direct_referrals,
            self.active_downline,
        ]
        .into_iter()
        .filter(|met| *met)
        .count() as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankProgress {
    pub current_rank: Rank,
    pub next_rank: Option<Rank>,
    pub requirements_met: RequirementsMet,
    /// Share of the four requirements met, in percent (0, 25, 50, 75 or 100).
    pub progress_percentage: u8,
    pub next_rank_requirements: Option<RankRequirement>,
}

/// Progress of `stats` toward the rank above its current one.
///
/// Returns `None` when `requirements` has no row for the current rank. At the
/// top of the ladder, or when the next rank has no requirement row, the
/// member is reported as fully progressed.
pub fn rank_progress(stats: &MemberStats, requirements: &[RankRequirement]) -> Option<RankProgress> {
    requirements.iter().find(|r| r.rank == stats.current_rank)?;

    let next_req = stats
        .current_rank
        .next()
        .and_then(|next| requirements.iter().find(|r| r.rank == next));

    let Some(next_req) = next_req else {
        return Some(RankProgress {
            current_rank: stats.current_rank,
            next_rank: None,
            requirements_met: RequirementsMet::ALL_MET,
            progress_percentage: 100,
            next_rank_requirements: None,
        });
    };

    let met = RequirementsMet {
        personal_volume: stats.personal_volume_cents >= next_req.min_personal_volume_cents,
        team_volume: stats.team_volume_cents >= next_req.min_team_volume_cents,
        direct_referrals: stats.direct_referrals >= next_req.min_direct_referrals,
        active_downline: stats.active_downline >= next_req.min_active_downline,
    };

    Some(RankProgress {
        current_rank: stats.current_rank,
        next_rank: Some(next_req.rank),
        requirements_met: met,
        progress_percentage: met.count() * 25,
        next_rank_requirements: Some(next_req.clone()),
    })
}
