//! Storage seams used by the engines.
//!
//! The engines hold no per-user state. Everything mutable lives behind these
//! traits, and the implementations own the concurrency guarantees: XP awards
//! are a single read-modify-write transaction and unlocks are guarded by a
//! uniqueness constraint on (user, achievement).

pub mod sqlite;

pub use sqlite::{NewReport, ReportStatus, SeedSummary, SqliteStore};

use crate::achievements::catalog::AchievementDefinition;
use crate::error::StoreResult;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// The slice of a user record the gamification core reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub fullname: String,
    pub total_xp: u64,
    /// Cached value of `calculate_level(total_xp)`
    pub level: u32,
    pub created_at: DateTime<Utc>,
}

/// Totals before and after an XP award, as committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpUpdate {
    pub previous_xp: u64,
    pub total_xp: u64,
}

/// XP granted alongside an unlock, applied in the same transaction.
#[derive(Debug, Clone, Copy)]
pub struct XpGrant {
    pub amount: u64,
    pub level_for: fn(u64) -> u32,
}

/// Result of an unlock insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Inserted { xp: Option<XpUpdate> },
    AlreadyHeld,
}

/// An achievement held by a user, joined with its definition.
#[derive(Debug, Clone)]
pub struct UnlockRecord {
    pub user_id: UserId,
    pub achievement: AchievementDefinition,
    pub unlocked_at: DateTime<Utc>,
}

pub trait UserStore: Send + Sync {
    fn find_user(&self, user_id: &UserId) -> StoreResult<Option<UserRecord>>;

    /// Atomically add `delta` to the user's total and rewrite the cached level
    /// with `level_for(new_total)`. Returns `None` when the user is unknown.
    fn add_xp(
        &self,
        user_id: &UserId,
        delta: u64,
        level_for: fn(u64) -> u32,
    ) -> StoreResult<Option<XpUpdate>>;

    /// Users ordered by total XP, highest first, ties broken deterministically.
    fn top_users_by_xp(&self, limit: usize) -> StoreResult<Vec<UserRecord>>;
}

/// Read-only queries over a user's report history.
pub trait ReportAnalytics: Send + Sync {
    fn report_count(&self, user_id: &UserId) -> StoreResult<u64>;

    fn report_count_with_status(&self, user_id: &UserId, status: &str) -> StoreResult<u64>;

    fn distinct_road_count(&self, user_id: &UserId) -> StoreResult<u64>;

    fn has_report_scoring_above(&self, user_id: &UserId, threshold: f64) -> StoreResult<bool>;

    fn has_report_with_class(&self, user_id: &UserId, class: &str) -> StoreResult<bool>;

    /// Distinct local calendar days with at least one report created at or after `since`.
    fn report_days_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
        offset: FixedOffset,
    ) -> StoreResult<Vec<NaiveDate>>;

    /// Whether any report was created before `hour` local time.
    fn has_report_before_hour(
        &self,
        user_id: &UserId,
        hour: u32,
        offset: FixedOffset,
    ) -> StoreResult<bool>;
}

pub trait AchievementStore: Send + Sync {
    /// Catalog in definition order.
    fn definitions(&self) -> StoreResult<Vec<AchievementDefinition>>;

    fn unlocks_for_user(&self, user_id: &UserId) -> StoreResult<Vec<UnlockRecord>>;

    fn has_unlock(&self, user_id: &UserId, achievement_id: &str) -> StoreResult<bool>;

    /// Insert an unlock unless the pair is already held. The uniqueness check
    /// happens in storage, so concurrent callers cannot both insert.
    fn insert_unlock(
        &self,
        user_id: &UserId,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
        grant: Option<XpGrant>,
    ) -> StoreResult<UnlockOutcome>;
}
