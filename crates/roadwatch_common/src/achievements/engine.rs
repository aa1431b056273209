//! Achievement evaluation.
//!
//! Walks the catalog in order, evaluates each criterion not yet held against
//! the user's report history and records new unlocks. Metric queries are
//! shared across criteria within one call. A failed query only skips the
//! criteria that depend on it; unlock writes propagate their errors.

use super::catalog::{AchievementCategory, AchievementDefinition, Criterion};
use crate::error::{GamificationError, Result};
use crate::progression::calculate_level;
use crate::store::{
    AchievementStore, ReportAnalytics, UnlockOutcome, UserId, UserStore, XpGrant,
};
use chrono::{DateTime, Duration, FixedOffset, Offset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How unlocks interact with XP and local time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AchievementPolicy {
    /// Grant each achievement's `xp_reward` when it unlocks
    pub award_xp_on_unlock: bool,
    /// Offset used for calendar days and hour-of-day criteria
    pub utc_offset: FixedOffset,
}

impl Default for AchievementPolicy {
    fn default() -> Self {
        Self {
            award_xp_on_unlock: false,
            utc_offset: Utc.fix(),
        }
    }
}

/// An achievement unlocked by the current check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAchievement {
    pub achievement_id: String,
    pub name: String,
    pub description: String,
    pub badge_url: String,
    /// XP granted with the unlock, 0 unless the policy awards XP
    pub xp_awarded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub badge_url: String,
    pub category: AchievementCategory,
    pub xp_reward: u64,
    pub unlocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<String>,
}

impl AchievementStatus {
    fn new(def: &AchievementDefinition, unlocked_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            badge_url: def.badge_url.clone(),
            category: def.category,
            xp_reward: def.xp_reward,
            unlocked: unlocked_at.is_some(),
            unlocked_at: unlocked_at.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementList {
    pub achievements: Vec<AchievementStatus>,
    pub total_count: usize,
    pub unlocked_count: usize,
}

/// Quantity a criterion is measured against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Metric {
    ReportCount,
    StatusCount(String),
    DistinctRoads,
    /// Threshold stored as raw bits so the key stays hashable
    ScoreAbove(u64),
    DamageClass(String),
    ActiveDays(u32),
    BeforeHour(u32),
}

impl Metric {
    fn for_criterion(criterion: &Criterion) -> Self {
        match criterion {
            Criterion::ReportCount { .. } => Metric::ReportCount,
            Criterion::StatusCount { status, .. } => Metric::StatusCount(status.clone()),
            Criterion::DistinctRoads { .. } => Metric::DistinctRoads,
            Criterion::ScoreAbove { threshold } => Metric::ScoreAbove(threshold.to_bits()),
            Criterion::DamageClass { class } => Metric::DamageClass(class.clone()),
            Criterion::ActiveDays { window_days, .. } => Metric::ActiveDays(*window_days),
            Criterion::BeforeHour { hour } => Metric::BeforeHour(*hour),
        }
    }
}

/// Per-call memo of metric values. `None` marks a query that failed.
struct MetricCache<'a, S> {
    store: &'a S,
    user_id: &'a UserId,
    offset: FixedOffset,
    now: DateTime<Utc>,
    values: HashMap<Metric, Option<u64>>,
}

impl<'a, S: ReportAnalytics> MetricCache<'a, S> {
    fn new(store: &'a S, user_id: &'a UserId, offset: FixedOffset, now: DateTime<Utc>) -> Self {
        Self {
            store,
            user_id,
            offset,
            now,
            values: HashMap::new(),
        }
    }

    fn value(&mut self, metric: Metric) -> Option<u64> {
        if let Some(cached) = self.values.get(&metric) {
            return *cached;
        }

        let value = match self.query(&metric) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Metric {:?} failed for user {}: {}", metric, self.user_id, e);
                None
            }
        };
        self.values.insert(metric, value);
        value
    }

    fn query(&self, metric: &Metric) -> crate::error::StoreResult<u64> {
        let store = self.store;
        let user = self.user_id;
        match metric {
            Metric::ReportCount => store.report_count(user),
            Metric::StatusCount(status) => store.report_count_with_status(user, status),
            Metric::DistinctRoads => store.distinct_road_count(user),
            Metric::ScoreAbove(bits) => store
                .has_report_scoring_above(user, f64::from_bits(*bits))
                .map(u64::from),
            Metric::DamageClass(class) => store.has_report_with_class(user, class).map(u64::from),
            Metric::ActiveDays(window_days) => {
                let since = self.now - Duration::days(i64::from(*window_days));
                store
                    .report_days_since(user, since, self.offset)
                    .map(|days| days.len() as u64)
            }
            Metric::BeforeHour(hour) => store
                .has_report_before_hour(user, *hour, self.offset)
                .map(u64::from),
        }
    }

    /// `None` when the metric behind the criterion could not be read
    fn satisfies(&mut self, criterion: &Criterion) -> Option<bool> {
        let value = self.value(Metric::for_criterion(criterion))?;
        let met = match criterion {
            Criterion::ReportCount { at_least }
            | Criterion::StatusCount { at_least, .. }
            | Criterion::DistinctRoads { at_least } => value >= *at_least,
            Criterion::ActiveDays { at_least, .. } => value >= u64::from(*at_least),
            Criterion::ScoreAbove { .. }
            | Criterion::DamageClass { .. }
            | Criterion::BeforeHour { .. } => value > 0,
        };
        Some(met)
    }
}

/// Evaluates and reports achievements for users
pub struct AchievementEngine<S> {
    store: Arc<S>,
    policy: AchievementPolicy,
}

impl<S> AchievementEngine<S>
where
    S: UserStore + ReportAnalytics + AchievementStore,
{
    pub fn new(store: Arc<S>, policy: AchievementPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AchievementPolicy {
        &self.policy
    }

    fn require_user(&self, user_id: &UserId) -> Result<()> {
        match self.store.find_user(user_id)? {
            Some(_) => Ok(()),
            None => Err(GamificationError::UserNotFound(*user_id)),
        }
    }

    /// Unlock every achievement whose criterion now holds. Returns the new
    /// unlocks in catalog order; an empty list when nothing qualifies.
    pub fn check_and_unlock_achievements(&self, user_id: &UserId) -> Result<Vec<NewAchievement>> {
        self.require_user(user_id)?;

        let definitions = self.store.definitions()?;
        let now = Utc::now();
        let mut metrics = MetricCache::new(self.store.as_ref(), user_id, self.policy.utc_offset, now);
        let mut unlocked = Vec::new();

        for def in &definitions {
            match self.store.has_unlock(user_id, &def.id) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!("Unlock lookup for {} failed, skipping: {}", def.id, e);
                    continue;
                }
            }

            match metrics.satisfies(&def.criterion) {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    debug!("Skipping {} for user {} this round", def.id, user_id);
                    continue;
                }
            }

            let grant = (self.policy.award_xp_on_unlock && def.xp_reward > 0).then_some(XpGrant {
                amount: def.xp_reward,
                level_for: calculate_level,
            });

            match self.store.insert_unlock(user_id, &def.id, now, grant)? {
                UnlockOutcome::Inserted { xp } => {
                    let xp_awarded = xp.map(|u| u.total_xp - u.previous_xp).unwrap_or(0);
                    info!(
                        "User {} unlocked {} ({} XP awarded)",
                        user_id, def.id, xp_awarded
                    );
                    unlocked.push(NewAchievement {
                        achievement_id: def.id.clone(),
                        name: def.name.clone(),
                        description: def.description.clone(),
                        badge_url: def.badge_url.clone(),
                        xp_awarded,
                    });
                }
                UnlockOutcome::AlreadyHeld => {
                    debug!("{} already held by {}, concurrent check won", def.id, user_id);
                }
            }
        }

        Ok(unlocked)
    }

    /// Full catalog annotated with the user's unlocks
    pub fn get_user_achievements(&self, user_id: &UserId) -> Result<AchievementList> {
        self.require_user(user_id)?;

        let definitions = self.store.definitions()?;
        let held: HashMap<String, DateTime<Utc>> = self
            .store
            .unlocks_for_user(user_id)?
            .into_iter()
            .map(|u| (u.achievement.id, u.unlocked_at))
            .collect();

        let achievements: Vec<_> = definitions
            .iter()
            .map(|def| AchievementStatus::new(def, held.get(&def.id).copied()))
            .collect();
        let unlocked_count = achievements.iter().filter(|a| a.unlocked).count();

        Ok(AchievementList {
            total_count: achievements.len(),
            unlocked_count,
            achievements,
        })
    }

    /// Only the achievements the user holds
    pub fn get_unlocked_achievements(&self, user_id: &UserId) -> Result<AchievementList> {
        self.require_user(user_id)?;

        let achievements: Vec<_> = self
            .store
            .unlocks_for_user(user_id)?
            .iter()
            .map(|u| AchievementStatus::new(&u.achievement, Some(u.unlocked_at)))
            .collect();

        Ok(AchievementList {
            total_count: achievements.len(),
            unlocked_count: achievements.len(),
            achievements,
        })
    }
}
