//! Roadwatch Configuration
//!
//! Database, server and gamification settings.
//! Config file: ~/.config/roadwatch/config.toml or /etc/roadwatch/config.toml

use crate::achievements::{AchievementPolicy, Catalog};
use crate::progression::LeaderboardLimits;
use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "ROADWATCH_CONFIG";

/// Largest UTC offset any real zone uses, in minutes
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a writer waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("roadwatch")
        .join("roadwatch.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamificationConfig {
    /// Grant an achievement's XP reward when it unlocks
    #[serde(default)]
    pub award_xp_on_unlock: bool,

    /// Local time offset for streak days and the early-bird hour
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_leaderboard_limit")]
    pub leaderboard_default_limit: usize,

    #[serde(default = "default_leaderboard_max")]
    pub leaderboard_max_limit: usize,

    /// Optional TOML catalog replacing the built-in achievements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
}

fn default_leaderboard_limit() -> usize {
    crate::progression::engine::DEFAULT_LEADERBOARD_LIMIT
}

fn default_leaderboard_max() -> usize {
    crate::progression::engine::MAX_LEADERBOARD_LIMIT
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            award_xp_on_unlock: false,
            utc_offset_minutes: 0,
            leaderboard_default_limit: default_leaderboard_limit(),
            leaderboard_max_limit: default_leaderboard_max(),
            catalog_path: None,
        }
    }
}

impl GamificationConfig {
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .with_context(|| format!("Invalid utc_offset_minutes: {}", self.utc_offset_minutes))
    }

    pub fn policy(&self) -> Result<AchievementPolicy> {
        Ok(AchievementPolicy {
            award_xp_on_unlock: self.award_xp_on_unlock,
            utc_offset: self.utc_offset()?,
        })
    }

    pub fn limits(&self) -> LeaderboardLimits {
        LeaderboardLimits {
            default_limit: self.leaderboard_default_limit,
            max_limit: self.leaderboard_max_limit,
        }
    }

    /// Configured catalog file, or the built-in reference catalog
    pub fn catalog(&self) -> Result<Catalog> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path)
                .with_context(|| format!("Failed to load catalog {}", path.display())),
            None => Ok(Catalog::reference()),
        }
    }
}

/// Main Roadwatch configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadwatchConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub gamification: GamificationConfig,
}

impl RoadwatchConfig {
    /// Get default user config path: ~/.config/roadwatch/config.toml
    pub fn user_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Cannot determine config directory")?;
        Ok(config_dir.join("roadwatch").join("config.toml"))
    }

    /// Get system config path: /etc/roadwatch/config.toml
    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc/roadwatch/config.toml")
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. Explicit path (argument, then $ROADWATCH_CONFIG)
    /// 2. User config (~/.config/roadwatch/config.toml)
    /// 3. System config (/etc/roadwatch/config.toml)
    /// 4. Defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        if let Some(path) = explicit.map(Path::to_path_buf).or(from_env) {
            return Self::load_from(&path);
        }

        if let Ok(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::load_from(&user_path);
            }
        }

        let system_path = Self::system_config_path();
        if system_path.exists() {
            return Self::load_from(&system_path);
        }

        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: RoadwatchConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.gamification;
        if g.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            anyhow::bail!(
                "utc_offset_minutes {} is outside -{}..={}",
                g.utc_offset_minutes,
                MAX_OFFSET_MINUTES,
                MAX_OFFSET_MINUTES
            );
        }
        if g.leaderboard_default_limit == 0 {
            anyhow::bail!("leaderboard_default_limit must be at least 1");
        }
        if g.leaderboard_default_limit > g.leaderboard_max_limit {
            anyhow::bail!(
                "leaderboard_default_limit {} exceeds leaderboard_max_limit {}",
                g.leaderboard_default_limit,
                g.leaderboard_max_limit
            );
        }
        Ok(())
    }

    /// Save configuration to user config file
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::user_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RoadwatchConfig::default();
        assert!(!config.gamification.award_xp_on_unlock);
        assert_eq!(config.gamification.leaderboard_default_limit, 10);
        assert_eq!(config.gamification.leaderboard_max_limit, 100);
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RoadwatchConfig::from_toml_str(
            r#"
            [gamification]
            award_xp_on_unlock = true
            utc_offset_minutes = 420
            "#,
        )
        .unwrap();

        assert!(config.gamification.award_xp_on_unlock);
        assert_eq!(config.gamification.utc_offset().unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.gamification.limits(), LeaderboardLimits::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RoadwatchConfig::from_toml_str("[gamification]\nutc_offset_minutes = 900").is_err());
        assert!(RoadwatchConfig::from_toml_str("[gamification]\nleaderboard_default_limit = 0").is_err());
        assert!(RoadwatchConfig::from_toml_str(
            "[gamification]\nleaderboard_default_limit = 50\nleaderboard_max_limit = 20"
        )
        .is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RoadwatchConfig::default();
        config.database.path = dir.path().join("rw.db");
        config.gamification.utc_offset_minutes = -300;
        config.save_to(&path).unwrap();

        let loaded = RoadwatchConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_catalog_falls_back_to_reference() {
        let config = GamificationConfig::default();
        assert_eq!(config.catalog().unwrap().len(), 12);

        let missing = GamificationConfig {
            catalog_path: Some(PathBuf::from("/nonexistent/catalog.toml")),
            ..GamificationConfig::default()
        };
        assert!(missing.catalog().is_err());
    }
}
