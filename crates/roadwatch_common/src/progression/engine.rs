//! Rank Engine
//!
//! Turns stored XP into rank views, applies XP awards and builds the
//! leaderboard. Holds no per-user state; the store owns atomicity.

use super::levels::{calculate_level, rank_for_level, LevelUp, UserRank};
use crate::error::{GamificationError, Result};
use crate::store::{UserId, UserStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

// ============================================================================
// Leaderboard
// ============================================================================

/// Leaderboard size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for LeaderboardLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LEADERBOARD_LIMIT,
            max_limit: MAX_LEADERBOARD_LIMIT,
        }
    }
}

impl LeaderboardLimits {
    /// Missing or zero requests get the default; large ones are clamped
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => self.default_limit,
            Some(n) => n.min(self.max_limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based board position, not the rank tier
    pub position: usize,
    pub user_id: UserId,
    pub fullname: String,
    pub total_xp: u64,
    pub level: u32,
    pub rank_name: String,
}

// ============================================================================
// Engine
// ============================================================================

pub struct RankEngine<S> {
    store: Arc<S>,
    limits: LeaderboardLimits,
}

impl<S: UserStore> RankEngine<S> {
    pub fn new(store: Arc<S>, limits: LeaderboardLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &LeaderboardLimits {
        &self.limits
    }

    /// Progress view computed from the stored total, never the cached level
    pub fn get_user_rank(&self, user_id: &UserId) -> Result<UserRank> {
        let user = self
            .store
            .find_user(user_id)?
            .ok_or(GamificationError::UserNotFound(*user_id))?;
        Ok(UserRank::from_xp(user.total_xp))
    }

    pub fn add_xp_to_user(&self, user_id: &UserId, xp: u64) -> Result<LevelUp> {
        let update = self
            .store
            .add_xp(user_id, xp, calculate_level)?
            .ok_or(GamificationError::UserNotFound(*user_id))?;

        let result = LevelUp::between(update.previous_xp, update.total_xp);
        if result.leveled_up {
            info!(
                "User {} reached level {} (was {})",
                user_id, result.new_level, result.old_level
            );
        }
        if let Some(rank) = &result.new_rank_name {
            info!("User {} promoted to {}", user_id, rank);
        }
        Ok(result)
    }

    pub fn get_leaderboard(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let limit = self.limits.resolve(limit);
        let users = self.store.top_users_by_xp(limit)?;

        Ok(users
            .into_iter()
            .enumerate()
            .map(|(i, user)| {
                let level = calculate_level(user.total_xp);
                LeaderboardEntry {
                    position: i + 1,
                    user_id: user.id,
                    fullname: user.fullname,
                    total_xp: user.total_xp,
                    level,
                    rank_name: rank_for_level(level).name.to_string(),
                }
            })
            .collect())
    }
}
