//! Command implementations for roadwatchctl

use crate::output;
use anyhow::{Context, Result};
use roadwatch_common::progression::{
    cumulative_xp_for_level, rank_for_level, xp_for_level, MAX_LEVEL,
};
use roadwatch_common::store::{NewReport, ReportStatus, UserId};
use roadwatch_common::{AchievementEngine, RankEngine, RoadwatchConfig, SqliteStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global flags shared by every command
pub struct CliContext {
    config_path: Option<PathBuf>,
    json: bool,
}

impl CliContext {
    pub fn new(config_path: Option<&Path>, json: bool) -> Self {
        Self {
            config_path: config_path.map(Path::to_path_buf),
            json,
        }
    }

    fn config(&self) -> Result<RoadwatchConfig> {
        RoadwatchConfig::load(self.config_path.as_deref())
    }

    fn open(&self) -> Result<(RoadwatchConfig, Arc<SqliteStore>)> {
        let config = self.config()?;
        let store = SqliteStore::open(&config.database.path, config.database.busy_timeout())
            .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
        Ok((config, Arc::new(store)))
    }

    fn ranks(&self) -> Result<RankEngine<SqliteStore>> {
        let (config, store) = self.open()?;
        Ok(RankEngine::new(store, config.gamification.limits()))
    }

    fn achievements(&self) -> Result<AchievementEngine<SqliteStore>> {
        let (config, store) = self.open()?;
        Ok(AchievementEngine::new(store, config.gamification.policy()?))
    }

    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

fn parse_user_id(raw: &str) -> Result<UserId> {
    UserId::parse_str(raw).with_context(|| format!("Invalid user id '{}'", raw))
}

pub fn seed(ctx: &CliContext) -> Result<()> {
    let (config, store) = ctx.open()?;
    let catalog = config.gamification.catalog()?;
    let summary = store.seed_catalog(&catalog)?;
    ctx.emit(&summary, |s| output::print_seed(s, store.path()))
}

pub fn add_user(ctx: &CliContext, username: &str, fullname: &str) -> Result<()> {
    let (_, store) = ctx.open()?;
    let user = store
        .create_user(username, fullname)
        .with_context(|| format!("Failed to create user '{}'", username))?;
    ctx.emit(&user, output::print_user)
}

#[derive(Serialize)]
struct RecordedReport {
    report_id: String,
}

pub fn report(
    ctx: &CliContext,
    user_id: &str,
    road_name: &str,
    score: f64,
    class: Option<&str>,
) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let (_, store) = ctx.open()?;

    let mut report = NewReport::new(user_id, road_name).score(score);
    if let Some(class) = class {
        report = report.class(class);
    }
    let report_id = store.record_report(&report)?;
    ctx.emit(&RecordedReport { report_id }, |r| {
        output::print_ok(&format!("Recorded report {}", r.report_id))
    })
}

pub fn verify(ctx: &CliContext, report_id: &str) -> Result<()> {
    let (_, store) = ctx.open()?;
    if !store.set_report_status(report_id, ReportStatus::Finished)? {
        anyhow::bail!("Report '{}' not found", report_id);
    }
    ctx.emit(&RecordedReport { report_id: report_id.to_string() }, |r| {
        output::print_ok(&format!("Report {} verified", r.report_id))
    })
}

pub fn rank(ctx: &CliContext, user_id: &str) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let rank = ctx.ranks()?.get_user_rank(&user_id)?;
    ctx.emit(&rank, output::print_rank)
}

pub fn award(ctx: &CliContext, user_id: &str, xp: u64) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let result = ctx.ranks()?.add_xp_to_user(&user_id, xp)?;
    ctx.emit(&result, output::print_level_up)
}

pub fn check(ctx: &CliContext, user_id: &str) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let unlocked = ctx.achievements()?.check_and_unlock_achievements(&user_id)?;
    ctx.emit(&unlocked, |u| output::print_new_achievements(u))
}

pub fn achievements(ctx: &CliContext, user_id: &str, unlocked_only: bool) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let engine = ctx.achievements()?;
    let list = if unlocked_only {
        engine.get_unlocked_achievements(&user_id)?
    } else {
        engine.get_user_achievements(&user_id)?
    };
    ctx.emit(&list, output::print_achievement_list)
}

pub fn leaderboard(ctx: &CliContext, limit: Option<usize>) -> Result<()> {
    let entries = ctx.ranks()?.get_leaderboard(limit)?;
    ctx.emit(&entries, |e| output::print_leaderboard(e))
}

#[derive(Serialize)]
pub struct CurveRow {
    pub level: u32,
    pub xp_for_level: u64,
    pub cumulative_xp: u64,
    pub rank_name: &'static str,
}

pub fn curve(ctx: &CliContext) -> Result<()> {
    let rows: Vec<CurveRow> = (1..=MAX_LEVEL)
        .map(|level| CurveRow {
            level,
            xp_for_level: xp_for_level(level),
            cumulative_xp: cumulative_xp_for_level(level),
            rank_name: rank_for_level(level).name,
        })
        .collect();
    ctx.emit(&rows, |r| output::print_curve(r))
}
