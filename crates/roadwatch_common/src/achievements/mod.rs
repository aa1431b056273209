//! Achievements
//!
//! - `catalog`: data-driven achievement definitions and criteria
//! - `engine`: evaluation, unlocks and read views

pub mod catalog;
pub mod engine;

pub use catalog::{
    AchievementCategory, AchievementDefinition, Catalog, Criterion, CLASS_VERY_POOR,
    STATUS_VERIFIED,
};
pub use engine::{
    AchievementEngine, AchievementList, AchievementPolicy, AchievementStatus, NewAchievement,
};
