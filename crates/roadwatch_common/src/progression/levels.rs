//! Level System
//!
//! Reporter levels 1-10 on a geometric XP curve, grouped into rank tiers.
//!
//! ## XP Curve
//!
//! XP required to go from level L-1 to level L: floor(base_xp * multiplier^(L-1))
//! - base_xp = 100
//! - multiplier = 1.5
//!
//! This means:
//! - Level 2: 150 XP total
//! - Level 5: 1,218 XP total
//! - Level 10: 11,230 XP total

use serde::{Deserialize, Serialize};

pub const XP_BASE: f64 = 100.0;
pub const XP_MULTIPLIER: f64 = 1.5;
pub const MAX_LEVEL: u32 = 10;

/// A rank tier: the highest tier whose `min_level` is at or below a user's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankTier {
    /// 1-based position in [`RANK_TIERS`]
    pub index: u32,
    pub min_level: u32,
    pub name: &'static str,
}

/// Tier table, ascending by `min_level`
pub const RANK_TIERS: &[RankTier] = &[
    RankTier { index: 1, min_level: 1, name: "Bronze Reporter" },
    RankTier { index: 2, min_level: 3, name: "Silver Reporter" },
    RankTier { index: 3, min_level: 5, name: "Gold Reporter" },
    RankTier { index: 4, min_level: 7, name: "Platinum Reporter" },
    RankTier { index: 5, min_level: 9, name: "Diamond Reporter" },
];

/// XP needed to advance from `level - 1` to `level`.
///
/// Level 1 is the starting level and costs nothing.
pub fn xp_for_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    (XP_BASE * XP_MULTIPLIER.powi((level - 1) as i32)) as u64
}

/// Total XP needed to reach `level` from zero.
///
/// Summed level by level so each step keeps its own floor rounding.
pub fn cumulative_xp_for_level(level: u32) -> u64 {
    (2..=level).map(xp_for_level).sum()
}

/// Highest level whose cumulative requirement is covered by `total_xp`.
pub fn calculate_level(total_xp: u64) -> u32 {
    for level in (1..=MAX_LEVEL).rev() {
        if total_xp >= cumulative_xp_for_level(level) {
            return level;
        }
    }
    1
}

/// Tier for a level. Levels below the first threshold fall back to the first tier.
pub fn rank_for_level(level: u32) -> &'static RankTier {
    RANK_TIERS
        .iter()
        .rev()
        .find(|tier| level >= tier.min_level)
        .unwrap_or(&RANK_TIERS[0])
}

/// Progress view for a total XP value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRank {
    pub level: u32,
    /// Tier index, 1-based
    pub rank: u32,
    pub rank_name: String,
    pub total_xp: u64,
    /// XP accumulated inside the current level
    pub current_xp: u64,
    /// XP still missing for the next level (0 when capped)
    pub xp_to_next: u64,
    /// Percentage toward the next level, two decimals, 0-100
    pub progress: f64,
    pub next_level: u32,
    /// True once MAX_LEVEL is reached
    pub capped: bool,
}

impl UserRank {
    pub fn from_xp(total_xp: u64) -> Self {
        let level = calculate_level(total_xp);
        let tier = rank_for_level(level);
        let level_start = cumulative_xp_for_level(level);
        let current_xp = total_xp.saturating_sub(level_start);

        if level >= MAX_LEVEL {
            return Self {
                level,
                rank: tier.index,
                rank_name: tier.name.to_string(),
                total_xp,
                current_xp,
                xp_to_next: 0,
                progress: 100.0,
                next_level: level,
                capped: true,
            };
        }

        let level_span = cumulative_xp_for_level(level + 1) - level_start;
        let progress = if level_span == 0 {
            100.0
        } else {
            let raw = current_xp as f64 / level_span as f64 * 100.0;
            ((raw * 100.0).round() / 100.0).clamp(0.0, 100.0)
        };

        Self {
            level,
            rank: tier.index,
            rank_name: tier.name.to_string(),
            total_xp,
            current_xp,
            xp_to_next: level_span.saturating_sub(current_xp),
            progress,
            next_level: level + 1,
            capped: false,
        }
    }
}

/// Outcome of adding XP to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub leveled_up: bool,
    pub old_level: u32,
    pub new_level: u32,
    pub xp_gained: u64,
    pub rank_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_rank_name: Option<String>,
}

impl LevelUp {
    /// Compare the standing before and after an award.
    pub fn between(previous_xp: u64, total_xp: u64) -> Self {
        let old_level = calculate_level(previous_xp);
        let new_level = calculate_level(total_xp);
        let old_tier = rank_for_level(old_level);
        let new_tier = rank_for_level(new_level);
        let rank_changed = new_tier.index > old_tier.index;

        Self {
            leveled_up: new_level > old_level,
            old_level,
            new_level,
            xp_gained: total_xp.saturating_sub(previous_xp),
            rank_changed,
            new_rank_name: rank_changed.then(|| new_tier.name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xp_for_level_values() {
        assert_eq!(xp_for_level(0), 0);
        assert_eq!(xp_for_level(1), 0);
        assert_eq!(xp_for_level(2), 150);
        assert_eq!(xp_for_level(3), 225);
        assert_eq!(xp_for_level(4), 337);
        assert_eq!(xp_for_level(5), 506);
        assert_eq!(xp_for_level(10), 3844);
    }

    #[test]
    fn test_cumulative_xp_table() {
        let expected = [0, 150, 375, 712, 1218, 1977, 3116, 4824, 7386, 11230];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(cumulative_xp_for_level(i as u32 + 1), *want, "level {}", i + 1);
        }
    }

    #[test]
    fn test_cumulative_consistency() {
        assert_eq!(cumulative_xp_for_level(1), 0);
        for level in 2..=12 {
            assert_eq!(
                cumulative_xp_for_level(level),
                cumulative_xp_for_level(level - 1) + xp_for_level(level)
            );
        }
    }

    #[test]
    fn test_level_from_xp() {
        assert_eq!(calculate_level(0), 1);
        assert_eq!(calculate_level(149), 1);
        assert_eq!(calculate_level(150), 2);
        assert_eq!(calculate_level(374), 2);
        assert_eq!(calculate_level(375), 3);
        assert_eq!(calculate_level(11_229), 9);
        assert_eq!(calculate_level(11_230), 10);
        assert_eq!(calculate_level(u64::MAX), 10);
    }

    #[test]
    fn test_rank_tiers() {
        assert_eq!(rank_for_level(1).name, "Bronze Reporter");
        assert_eq!(rank_for_level(2).index, 1);
        assert_eq!(rank_for_level(3).name, "Silver Reporter");
        assert_eq!(rank_for_level(6).name, "Gold Reporter");
        assert_eq!(rank_for_level(7).index, 4);
        assert_eq!(rank_for_level(10).name, "Diamond Reporter");
        assert_eq!(rank_for_level(0).index, 1);
    }

    #[test]
    fn test_fresh_user_rank() {
        let rank = UserRank::from_xp(0);
        assert_eq!(rank.level, 1);
        assert_eq!(rank.rank, 1);
        assert_eq!(rank.rank_name, "Bronze Reporter");
        assert_eq!(rank.progress, 0.0);
        assert_eq!(rank.xp_to_next, 150);
        assert_eq!(rank.next_level, 2);
        assert!(!rank.capped);
    }

    #[test]
    fn test_progress_rounding() {
        // 50 of 150 XP into level 1
        let rank = UserRank::from_xp(50);
        assert_eq!(rank.progress, 33.33);
        assert_eq!(rank.current_xp, 50);
        assert_eq!(rank.xp_to_next, 100);

        // 375 + 112 of 337 into level 3
        let rank = UserRank::from_xp(487);
        assert_eq!(rank.level, 3);
        assert_eq!(rank.current_xp, 112);
        assert_eq!(rank.progress, 33.23);
    }

    #[test]
    fn test_max_level_is_capped() {
        let rank = UserRank::from_xp(cumulative_xp_for_level(MAX_LEVEL) + 9_999);
        assert_eq!(rank.level, MAX_LEVEL);
        assert_eq!(rank.progress, 100.0);
        assert_eq!(rank.next_level, MAX_LEVEL);
        assert_eq!(rank.xp_to_next, 0);
        assert!(rank.capped);
    }

    #[test]
    fn test_level_up_detection() {
        let up = LevelUp::between(100, 400);
        assert!(up.leveled_up);
        assert_eq!(up.old_level, 1);
        assert_eq!(up.new_level, 3);
        assert_eq!(up.xp_gained, 300);
        assert!(up.rank_changed);
        assert_eq!(up.new_rank_name.as_deref(), Some("Silver Reporter"));

        let flat = LevelUp::between(160, 200);
        assert!(!flat.leveled_up);
        assert!(!flat.rank_changed);
        assert!(flat.new_rank_name.is_none());
    }

    #[test]
    fn test_level_up_omits_rank_name_in_json() {
        let json = serde_json::to_string(&LevelUp::between(0, 10)).unwrap();
        assert!(!json.contains("new_rank_name"));
    }
}
