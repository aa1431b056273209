//! SQLite store
//!
//! Backs users, reports, the achievement catalog and unlocks with one SQLite
//! database. Each handle owns one connection; several handles (or processes)
//! may share a database file. Writers take `BEGIN IMMEDIATE` so XP
//! read-modify-write never interleaves, and `user_achievements` carries a
//! UNIQUE(user_id, achievement_id) constraint that makes unlocks exactly-once.
//!
//! Seeding replaces the live catalog. Ids missing from the new catalog are
//! deleted, or marked retired when someone already holds them.

use super::{
    AchievementStore, ReportAnalytics, UnlockOutcome, UnlockRecord, UserId, UserRecord, UserStore,
    XpGrant, XpUpdate,
};
use crate::achievements::catalog::{AchievementCategory, AchievementDefinition, Catalog, Criterion};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    fullname TEXT NOT NULL,
    total_xp INTEGER NOT NULL DEFAULT 0 CHECK (total_xp >= 0),
    level INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_leaderboard ON users(total_xp DESC, created_at);

CREATE TABLE IF NOT EXISTS reports (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    road_name TEXT NOT NULL,
    total_score REAL NOT NULL DEFAULT 0,
    destruct_class TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_user_created ON reports(user_id, created_at);

CREATE TABLE IF NOT EXISTS achievements (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    badge_url TEXT NOT NULL,
    category TEXT NOT NULL,
    xp_reward INTEGER NOT NULL DEFAULT 0,
    criterion TEXT NOT NULL,
    retired INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_achievements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES users(id),
    achievement_id TEXT NOT NULL REFERENCES achievements(id),
    unlocked_at TEXT NOT NULL,
    UNIQUE(user_id, achievement_id)
);
"#;

/// Report lifecycle states as the reporting service writes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending,
    Assigned,
    FinishedByWorker,
    /// Verified by an admin
    Finished,
    Complete,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Assigned => "assigned",
            ReportStatus::FinishedByWorker => "finish by worker",
            ReportStatus::Finished => "finished",
            ReportStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReportStatus::Pending),
            "assigned" => Some(ReportStatus::Assigned),
            "finish by worker" => Some(ReportStatus::FinishedByWorker),
            "finished" => Some(ReportStatus::Finished),
            "complete" => Some(ReportStatus::Complete),
            _ => None,
        }
    }
}

/// A report as written by the reporting service.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub user_id: UserId,
    pub road_name: String,
    pub total_score: f64,
    pub destruct_class: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

impl NewReport {
    pub fn new(user_id: UserId, road_name: &str) -> Self {
        Self {
            user_id,
            road_name: road_name.to_string(),
            total_score: 0.0,
            destruct_class: None,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn score(mut self, total_score: f64) -> Self {
        self.total_score = total_score;
        self
    }

    pub fn class(mut self, destruct_class: &str) -> Self {
        self.destruct_class = Some(destruct_class.to_string());
        self
    }

    pub fn status(mut self, status: ReportStatus) -> Self {
        self.status = status;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// How a seed run changed the catalog table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Dropped ids that users still hold; kept for their unlock history
    pub retired: usize,
    /// Dropped ids nobody held
    pub removed: usize,
}

/// SQLite-backed implementation of every store trait
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        debug!("Opened {} (journal_mode={})", path.display(), mode);

        let store = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;

        // Databases created before catalog retirement lack the column
        let has_retired: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('achievements') WHERE name = 'retired'",
            [],
            |row| row.get(0),
        )?;
        if has_retired == 0 {
            info!("Adding retired column to achievements");
            conn.execute(
                "ALTER TABLE achievements ADD COLUMN retired INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Write the catalog, keeping its order. Existing ids are refreshed in place
    /// and ids missing from `catalog` leave the live set.
    pub fn seed_catalog(&self, catalog: &Catalog) -> StoreResult<SeedSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut summary = SeedSummary::default();

        for (position, def) in catalog.iter().enumerate() {
            let criterion = serde_json::to_string(&def.criterion)?;
            let xp_reward = to_i64(def.xp_reward)?;
            let inserted = tx.execute(
                r#"
                INSERT OR IGNORE INTO achievements
                    (id, position, name, description, badge_url, category, xp_reward, criterion)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    &def.id,
                    position as i64,
                    &def.name,
                    &def.description,
                    &def.badge_url,
                    def.category.as_str(),
                    xp_reward,
                    &criterion
                ],
            )?;

            if inserted > 0 {
                info!("Seeded achievement: {}", def.id);
                summary.inserted += 1;
            } else {
                tx.execute(
                    r#"
                    UPDATE achievements SET
                        position = ?2, name = ?3, description = ?4, badge_url = ?5,
                        category = ?6, xp_reward = ?7, criterion = ?8, retired = 0
                    WHERE id = ?1
                    "#,
                    params![
                        &def.id,
                        position as i64,
                        &def.name,
                        &def.description,
                        &def.badge_url,
                        def.category.as_str(),
                        xp_reward,
                        &criterion
                    ],
                )?;
                summary.updated += 1;
            }
        }

        let stale: Vec<String> = {
            let mut stmt = tx.prepare("SELECT id FROM achievements WHERE retired = 0")?;
            let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut stale = Vec::new();
            for id in ids {
                let id = id?;
                if catalog.get(&id).is_none() {
                    stale.push(id);
                }
            }
            stale
        };

        // Retired rows sort after the live catalog
        let tail = catalog.len() as i64;
        for id in &stale {
            let held: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM user_achievements WHERE achievement_id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if held {
                tx.execute(
                    "UPDATE achievements SET retired = 1, position = ?2 WHERE id = ?1",
                    params![id, tail],
                )?;
                info!("Retired achievement: {}", id);
                summary.retired += 1;
            } else {
                tx.execute("DELETE FROM achievements WHERE id = ?1", params![id])?;
                info!("Removed achievement: {}", id);
                summary.removed += 1;
            }
        }

        tx.commit()?;
        info!(
            "Achievement seeding completed ({} new, {} refreshed, {} retired, {} removed)",
            summary.inserted, summary.updated, summary.retired, summary.removed
        );
        Ok(summary)
    }

    pub fn create_user(&self, username: &str, fullname: &str) -> StoreResult<UserRecord> {
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            fullname: fullname.to_string(),
            total_xp: 0,
            level: 1,
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.conn()?.execute(
            "INSERT INTO users (id, username, fullname, total_xp, level, created_at) VALUES (?1, ?2, ?3, 0, 1, ?4)",
            params![
                user.id.to_string(),
                &user.username,
                &user.fullname,
                user.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )?;
        Ok(user)
    }

    /// Store a report and return its id
    pub fn record_report(&self, report: &NewReport) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.conn()?.execute(
            r#"
            INSERT INTO reports (id, user_id, road_name, total_score, destruct_class, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                &id,
                report.user_id.to_string(),
                &report.road_name,
                report.total_score,
                &report.destruct_class,
                report.status.as_str(),
                fmt_ts(&report.created_at)
            ],
        )?;
        Ok(id)
    }

    /// Returns false when no report has that id
    pub fn set_report_status(&self, report_id: &str, status: ReportStatus) -> StoreResult<bool> {
        let changed = self.conn()?.execute(
            "UPDATE reports SET status = ?1 WHERE id = ?2",
            params![status.as_str(), report_id],
        )?;
        Ok(changed > 0)
    }
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::InvalidData(format!("bad user id '{}': {}", raw, e)))
}

fn to_u64(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative counter {}", value)))
}

fn to_i64(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidData(format!("value {} exceeds storage range", value)))
}

/// SQLite date modifier shifting UTC into local time
fn offset_modifier(offset: FixedOffset) -> String {
    format!("{:+} seconds", offset.local_minus_utc())
}

struct RawUser {
    id: String,
    username: String,
    fullname: String,
    total_xp: i64,
    level: i64,
    created_at: String,
}

impl RawUser {
    const COLUMNS: &'static str = "id, username, fullname, total_xp, level, created_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            fullname: row.get(2)?,
            total_xp: row.get(3)?,
            level: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_record(self) -> StoreResult<UserRecord> {
        Ok(UserRecord {
            id: parse_id(&self.id)?,
            username: self.username,
            fullname: self.fullname,
            total_xp: to_u64(self.total_xp)?,
            level: u32::try_from(self.level)
                .map_err(|_| StoreError::InvalidData(format!("bad level {}", self.level)))?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

struct RawDefinition {
    id: String,
    name: String,
    description: String,
    badge_url: String,
    category: String,
    xp_reward: i64,
    criterion: String,
}

impl RawDefinition {
    /// Column list, qualified for use in joins
    const COLUMNS: &'static str =
        "a.id, a.name, a.description, a.badge_url, a.category, a.xp_reward, a.criterion";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            badge_url: row.get(3)?,
            category: row.get(4)?,
            xp_reward: row.get(5)?,
            criterion: row.get(6)?,
        })
    }

    fn into_definition(self) -> StoreResult<AchievementDefinition> {
        let category = AchievementCategory::parse(&self.category).ok_or_else(|| {
            StoreError::InvalidData(format!("unknown category '{}' on {}", self.category, self.id))
        })?;
        let criterion: Criterion = serde_json::from_str(&self.criterion)?;
        Ok(AchievementDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            badge_url: self.badge_url,
            category,
            xp_reward: to_u64(self.xp_reward)?,
            criterion,
        })
    }
}

/// Read-modify-write of a user's XP on an open transaction
fn apply_xp(
    conn: &Connection,
    user_id: &UserId,
    delta: u64,
    level_for: fn(u64) -> u32,
) -> StoreResult<Option<XpUpdate>> {
    let current: Option<i64> = conn
        .query_row(
            "SELECT total_xp FROM users WHERE id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(current) = current else {
        return Ok(None);
    };

    let previous_xp = to_u64(current)?;
    let total_xp = previous_xp
        .checked_add(delta)
        .ok_or(StoreError::XpOverflow(*user_id))?;
    let stored = i64::try_from(total_xp).map_err(|_| StoreError::XpOverflow(*user_id))?;

    conn.execute(
        "UPDATE users SET total_xp = ?1, level = ?2 WHERE id = ?3",
        params![stored, level_for(total_xp), user_id.to_string()],
    )?;

    Ok(Some(XpUpdate { previous_xp, total_xp }))
}

impl UserStore for SqliteStore {
    fn find_user(&self, user_id: &UserId) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", RawUser::COLUMNS),
                params![user_id.to_string()],
                RawUser::from_row,
            )
            .optional()?;
        raw.map(RawUser::into_record).transpose()
    }

    fn add_xp(
        &self,
        user_id: &UserId,
        delta: u64,
        level_for: fn(u64) -> u32,
    ) -> StoreResult<Option<XpUpdate>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let update = apply_xp(&tx, user_id, delta, level_for)?;
        tx.commit()?;
        Ok(update)
    }

    fn top_users_by_xp(&self, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY total_xp DESC, created_at ASC, rowid ASC LIMIT ?1",
            RawUser::COLUMNS
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], RawUser::from_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?.into_record()?);
        }
        Ok(users)
    }
}

impl ReportAnalytics for SqliteStore {
    fn report_count(&self, user_id: &UserId) -> StoreResult<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM reports WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        to_u64(count)
    }

    fn report_count_with_status(&self, user_id: &UserId, status: &str) -> StoreResult<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM reports WHERE user_id = ?1 AND status = ?2",
            params![user_id.to_string(), status],
            |row| row.get(0),
        )?;
        to_u64(count)
    }

    fn distinct_road_count(&self, user_id: &UserId) -> StoreResult<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(DISTINCT road_name) FROM reports WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        to_u64(count)
    }

    fn has_report_scoring_above(&self, user_id: &UserId, threshold: f64) -> StoreResult<bool> {
        let found: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM reports WHERE user_id = ?1 AND total_score > ?2)",
            params![user_id.to_string(), threshold],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn has_report_with_class(&self, user_id: &UserId, class: &str) -> StoreResult<bool> {
        let found: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM reports WHERE user_id = ?1 AND destruct_class = ?2)",
            params![user_id.to_string(), class],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn report_days_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
        offset: FixedOffset,
    ) -> StoreResult<Vec<NaiveDate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT date(created_at, ?3) AS day
            FROM reports
            WHERE user_id = ?1 AND created_at >= ?2
            ORDER BY day
            "#,
        )?;
        let rows = stmt.query_map(
            params![user_id.to_string(), fmt_ts(&since), offset_modifier(offset)],
            |row| row.get::<_, String>(0),
        )?;

        let mut days = Vec::new();
        for row in rows {
            let raw = row?;
            let day = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| StoreError::InvalidData(format!("bad report date '{}': {}", raw, e)))?;
            days.push(day);
        }
        Ok(days)
    }

    fn has_report_before_hour(
        &self,
        user_id: &UserId,
        hour: u32,
        offset: FixedOffset,
    ) -> StoreResult<bool> {
        let found: bool = self.conn()?.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reports
                WHERE user_id = ?1
                  AND CAST(strftime('%H', created_at, ?2) AS INTEGER) < ?3
            )
            "#,
            params![user_id.to_string(), offset_modifier(offset), hour],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}

impl AchievementStore for SqliteStore {
    fn definitions(&self) -> StoreResult<Vec<AchievementDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM achievements a WHERE a.retired = 0 ORDER BY a.position, a.id",
            RawDefinition::COLUMNS
        ))?;
        let rows = stmt.query_map([], RawDefinition::from_row)?;

        let mut definitions = Vec::new();
        for row in rows {
            definitions.push(row?.into_definition()?);
        }
        Ok(definitions)
    }

    fn unlocks_for_user(&self, user_id: &UserId) -> StoreResult<Vec<UnlockRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}, ua.unlocked_at
            FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.user_id = ?1
            ORDER BY a.position, a.id
            "#,
            RawDefinition::COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok((RawDefinition::from_row(row)?, row.get::<_, String>(7)?))
        })?;

        let mut unlocks = Vec::new();
        for row in rows {
            let (raw, unlocked_at) = row?;
            unlocks.push(UnlockRecord {
                user_id: *user_id,
                achievement: raw.into_definition()?,
                unlocked_at: parse_ts(&unlocked_at)?,
            });
        }
        Ok(unlocks)
    }

    fn has_unlock(&self, user_id: &UserId, achievement_id: &str) -> StoreResult<bool> {
        let found: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM user_achievements WHERE user_id = ?1 AND achievement_id = ?2)",
            params![user_id.to_string(), achievement_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn insert_unlock(
        &self,
        user_id: &UserId,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
        grant: Option<XpGrant>,
    ) -> StoreResult<UnlockOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO user_achievements (user_id, achievement_id, unlocked_at) VALUES (?1, ?2, ?3)",
            params![user_id.to_string(), achievement_id, fmt_ts(&unlocked_at)],
        )?;
        if inserted == 0 {
            return Ok(UnlockOutcome::AlreadyHeld);
        }

        let xp = match grant {
            Some(grant) if grant.amount > 0 => {
                let update = apply_xp(&tx, user_id, grant.amount, grant.level_for)?;
                if update.is_none() {
                    return Err(StoreError::InvalidData(format!(
                        "unlock for unknown user {}",
                        user_id
                    )));
                }
                update
            }
            _ => None,
        };

        tx.commit()?;
        Ok(UnlockOutcome::Inserted { xp })
    }
}
