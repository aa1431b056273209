//! Progression
//!
//! - `levels`: XP curve, level inversion and rank tiers (pure functions)
//! - `engine`: rank views, XP awards and the leaderboard over a `UserStore`

pub mod engine;
pub mod levels;

pub use engine::{LeaderboardEntry, LeaderboardLimits, RankEngine};
pub use levels::{
    calculate_level, cumulative_xp_for_level, rank_for_level, xp_for_level, LevelUp, RankTier,
    UserRank, MAX_LEVEL, RANK_TIERS, XP_BASE, XP_MULTIPLIER,
};
