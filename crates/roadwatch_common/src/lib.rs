//! Roadwatch Common - Gamification core for the road damage reporting service
//!
//! Reporters earn XP, climb levels and rank tiers, and unlock achievements
//! computed from their report history.
//!
//! - `progression`: XP curve, rank tiers, rank engine, leaderboard
//! - `achievements`: data-driven catalog and achievement engine
//! - `store`: storage traits and the SQLite implementation
//! - `config`: TOML configuration

pub mod achievements;
pub mod config;
pub mod error;
pub mod progression;
pub mod store;

pub use achievements::{AchievementEngine, AchievementPolicy, Catalog};
pub use config::RoadwatchConfig;
pub use error::{GamificationError, StoreError};
pub use progression::{LevelUp, RankEngine, UserRank};
pub use store::{SqliteStore, UserId};
