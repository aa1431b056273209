//! Achievement catalog.
//!
//! Each definition carries its own unlock criterion, so a catalog loaded from
//! TOML can add achievements without touching the evaluator.

use crate::error::GamificationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Status a report carries once an admin has verified the worker's fix
pub const STATUS_VERIFIED: &str = "finished";

/// Worst damage class assigned by the scoring pipeline
pub const CLASS_VERY_POOR: &str = "Very Poor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementCategory {
    Milestone,
    Quality,
    Explorer,
    Streak,
}

impl AchievementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementCategory::Milestone => "milestone",
            AchievementCategory::Quality => "quality",
            AchievementCategory::Explorer => "explorer",
            AchievementCategory::Streak => "streak",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "milestone" => Some(AchievementCategory::Milestone),
            "quality" => Some(AchievementCategory::Quality),
            "explorer" => Some(AchievementCategory::Explorer),
            "streak" => Some(AchievementCategory::Streak),
            _ => None,
        }
    }
}

/// Predicate over a user's report history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    /// Total reports submitted
    ReportCount { at_least: u64 },
    /// Reports currently in `status`
    StatusCount { status: String, at_least: u64 },
    /// Distinct road names reported
    DistinctRoads { at_least: u64 },
    /// Any report with a composite score strictly above `threshold`
    ScoreAbove { threshold: f64 },
    /// Any report classified exactly as `class`
    DamageClass { class: String },
    /// Distinct local days with a report inside the trailing window
    ActiveDays { window_days: u32, at_least: u32 },
    /// Any report created before `hour` local time
    BeforeHour { hour: u32 },
}

impl Criterion {
    fn validate(&self) -> Result<(), String> {
        match self {
            Criterion::ActiveDays { window_days, at_least } => {
                if *window_days == 0 {
                    return Err("active_days window must be at least one day".to_string());
                }
                // A trailing window of N*24h touches at most N+1 calendar days
                if *at_least > window_days + 1 {
                    return Err(format!(
                        "active_days at_least {} can never be met in a {}-day window",
                        at_least, window_days
                    ));
                }
                Ok(())
            }
            Criterion::BeforeHour { hour } if *hour > 24 => {
                Err(format!("before_hour {} is not an hour of the day", hour))
            }
            Criterion::ScoreAbove { threshold } if !threshold.is_finite() => {
                Err("score_above threshold must be finite".to_string())
            }
            Criterion::StatusCount { status, .. } if status.trim().is_empty() => {
                Err("status_count needs a status".to_string())
            }
            Criterion::DamageClass { class } if class.trim().is_empty() => {
                Err("damage_class needs a class".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub badge_url: String,
    pub category: AchievementCategory,
    #[serde(default)]
    pub xp_reward: u64,
    pub criterion: Criterion,
}

impl AchievementDefinition {
    fn reference(
        id: &str,
        name: &str,
        description: &str,
        category: AchievementCategory,
        xp_reward: u64,
        criterion: Criterion,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            badge_url: format!("/badges/{}.webp", id),
            category,
            xp_reward,
            criterion,
        }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "achievement")]
    achievements: Vec<AchievementDefinition>,
}

/// Ordered achievement catalog. Evaluation and listings follow this order.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    definitions: Vec<AchievementDefinition>,
}

impl Catalog {
    pub fn new(definitions: Vec<AchievementDefinition>) -> Result<Self, GamificationError> {
        let mut seen = HashSet::new();
        for def in &definitions {
            if def.id.trim().is_empty() {
                return Err(GamificationError::Catalog("achievement with empty id".to_string()));
            }
            if !seen.insert(def.id.as_str()) {
                return Err(GamificationError::Catalog(format!("duplicate achievement id '{}'", def.id)));
            }
            def.criterion
                .validate()
                .map_err(|e| GamificationError::Catalog(format!("{}: {}", def.id, e)))?;
        }
        Ok(Self { definitions })
    }

    /// The reference deployment's twelve achievements
    pub fn reference() -> Self {
        use AchievementCategory::*;
        use Criterion::*;

        let definitions = vec![
            // Reporting milestones
            AchievementDefinition::reference("first_report", "First Step", "Submit your first road damage report", Milestone, 50, ReportCount { at_least: 1 }),
            AchievementDefinition::reference("road_warrior_5", "Road Watcher", "Submit 5 road damage reports", Milestone, 100, ReportCount { at_least: 5 }),
            AchievementDefinition::reference("road_warrior_25", "Street Guardian", "Submit 25 road damage reports", Milestone, 250, ReportCount { at_least: 25 }),
            AchievementDefinition::reference("road_warrior_100", "Infrastructure Hero", "Submit 100 road damage reports", Milestone, 500, ReportCount { at_least: 100 }),

            // Quality
            AchievementDefinition::reference("high_impact", "High Impact", "File a report with a total score above 80", Quality, 150, ScoreAbove { threshold: 80.0 }),
            AchievementDefinition::reference("critical_finder", "Critical Finder", "Report damage classified as 'Very Poor'", Quality, 200, DamageClass { class: CLASS_VERY_POOR.to_string() }),
            AchievementDefinition::reference("verified_contributor", "Verified Contributor", "Have a report verified by an admin", Quality, 100, StatusCount { status: STATUS_VERIFIED.to_string(), at_least: 1 }),
            AchievementDefinition::reference("perfect_10", "Perfect Ten", "Have 10 reports verified by an admin", Quality, 300, StatusCount { status: STATUS_VERIFIED.to_string(), at_least: 10 }),

            // Location explorer
            AchievementDefinition::reference("street_explorer", "Street Explorer", "Report damage on 5 different roads", Explorer, 150, DistinctRoads { at_least: 5 }),
            AchievementDefinition::reference("city_guardian", "City Guardian", "Report damage on 10 different roads", Explorer, 300, DistinctRoads { at_least: 10 }),

            // Streaks
            AchievementDefinition::reference("weekly_active", "Weekly Active", "Report on 7 different days within a week", Streak, 200, ActiveDays { window_days: 7, at_least: 7 }),
            AchievementDefinition::reference("early_bird", "Early Bird", "Submit a report before 7 AM", Streak, 75, BeforeHour { hour: 7 }),
        ];

        Self { definitions }
    }

    /// Parse a catalog from `[[achievement]]` tables
    pub fn from_toml_str(contents: &str) -> Result<Self, GamificationError> {
        let file: CatalogFile = toml::from_str(contents)
            .map_err(|e| GamificationError::Catalog(format!("invalid catalog: {}", e)))?;
        Self::new(file.achievements)
    }

    pub fn load(path: &Path) -> Result<Self, GamificationError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            GamificationError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AchievementDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definitions(&self) -> &[AchievementDefinition] {
        &self.definitions
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::reference()
    }
}
