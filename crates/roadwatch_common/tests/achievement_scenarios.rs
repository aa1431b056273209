//! End-to-end achievement scenarios against a real SQLite file.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use roadwatch_common::achievements::{AchievementEngine, AchievementPolicy, Catalog, NewAchievement};
use roadwatch_common::error::{StoreError, StoreResult};
use roadwatch_common::store::{
    AchievementStore, NewReport, ReportAnalytics, ReportStatus, SqliteStore, UnlockOutcome,
    UnlockRecord, UserId, UserRecord, UserStore, XpGrant, XpUpdate,
};
use roadwatch_common::achievements::AchievementDefinition;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn open_store(dir: &TempDir, catalog: &Catalog) -> Arc<SqliteStore> {
    let store = SqliteStore::open(
        &dir.path().join("roadwatch.db"),
        std::time::Duration::from_secs(10),
    )
    .unwrap();
    store.seed_catalog(catalog).unwrap();
    Arc::new(store)
}

/// Midday, well outside the trailing streak window
fn old_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
}

fn ids(unlocked: &[NewAchievement]) -> Vec<String> {
    unlocked.iter().map(|a| a.achievement_id.clone()).collect()
}

fn offset_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap()
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[test]
fn test_first_then_fifth_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());
    let user = store.create_user("rina", "Rina").unwrap();

    store.record_report(&NewReport::new(user.id, "Jl. Braga").at(old_noon())).unwrap();
    let first = engine.check_and_unlock_achievements(&user.id).unwrap();
    assert_eq!(ids(&first), vec!["first_report"]);
    assert_eq!(first[0].name, "First Step");
    assert_eq!(first[0].badge_url, "/badges/first_report.webp");

    for _ in 0..3 {
        store.record_report(&NewReport::new(user.id, "Jl. Braga").at(old_noon())).unwrap();
    }
    assert!(engine.check_and_unlock_achievements(&user.id).unwrap().is_empty());

    store.record_report(&NewReport::new(user.id, "Jl. Braga").at(old_noon())).unwrap();
    let fifth = engine.check_and_unlock_achievements(&user.id).unwrap();
    assert_eq!(ids(&fifth), vec!["road_warrior_5"]);
}

#[test]
fn test_ten_verified_unlocks_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());
    let user = store.create_user("budi", "Budi").unwrap();

    for _ in 0..10 {
        let id = store
            .record_report(&NewReport::new(user.id, "Jl. Malioboro").at(old_noon()))
            .unwrap();
        store.set_report_status(&id, ReportStatus::FinishedByWorker).unwrap();
        store.set_report_status(&id, ReportStatus::Finished).unwrap();
    }

    let unlocked = ids(&engine.check_and_unlock_achievements(&user.id).unwrap());
    assert_eq!(
        unlocked,
        vec!["first_report", "road_warrior_5", "verified_contributor", "perfect_10"]
    );
}

#[test]
fn test_worker_finished_is_not_verified() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());
    let user = store.create_user("wati", "Wati").unwrap();

    store
        .record_report(
            &NewReport::new(user.id, "Jl. Pemuda")
                .status(ReportStatus::FinishedByWorker)
                .at(old_noon()),
        )
        .unwrap();

    let unlocked = ids(&engine.check_and_unlock_achievements(&user.id).unwrap());
    assert!(!unlocked.contains(&"verified_contributor".to_string()));
}

#[test]
fn test_quality_and_explorer() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());
    let user = store.create_user("dewi", "Dewi").unwrap();

    // Exactly 80 is not above the threshold
    store
        .record_report(&NewReport::new(user.id, "Road 0").score(80.0).class("Poor").at(old_noon()))
        .unwrap();
    for i in 1..5 {
        store
            .record_report(&NewReport::new(user.id, &format!("Road {}", i)).at(old_noon()))
            .unwrap();
    }

    let unlocked = ids(&engine.check_and_unlock_achievements(&user.id).unwrap());
    assert!(unlocked.contains(&"street_explorer".to_string()));
    assert!(!unlocked.contains(&"high_impact".to_string()));
    assert!(!unlocked.contains(&"critical_finder".to_string()));
    assert!(!unlocked.contains(&"city_guardian".to_string()));

    store
        .record_report(
            &NewReport::new(user.id, "Road 0").score(80.5).class("Very Poor").at(old_noon()),
        )
        .unwrap();
    let unlocked = ids(&engine.check_and_unlock_achievements(&user.id).unwrap());
    assert_eq!(unlocked, vec!["high_impact", "critical_finder"]);
}

// ============================================================================
// Time-based criteria
// ============================================================================

#[test]
fn test_weekly_streak_counts_distinct_days() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());
    let user = store.create_user("agus", "Agus").unwrap();
    let now = Utc::now();

    // Many reports on six days is not a streak
    for day in 0..6 {
        for _ in 0..3 {
            store
                .record_report(&NewReport::new(user.id, "Jl. Kartini").at(now - Duration::days(day)))
                .unwrap();
        }
    }
    let unlocked = ids(&engine.check_and_unlock_achievements(&user.id).unwrap());
    assert!(!unlocked.contains(&"weekly_active".to_string()));

    store
        .record_report(
            &NewReport::new(user.id, "Jl. Kartini").at(now - Duration::days(6) - Duration::hours(1)),
        )
        .unwrap();
    let unlocked = ids(&engine.check_and_unlock_achievements(&user.id).unwrap());
    assert!(unlocked.contains(&"weekly_active".to_string()));
}

#[test]
fn test_streak_ignores_reports_outside_window() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let user = store.create_user("joko", "Joko").unwrap();
    let now = Utc::now();

    for day in 8..15 {
        store
            .record_report(&NewReport::new(user.id, "Jl. Gajah Mada").at(now - Duration::days(day)))
            .unwrap();
    }
    let days: Vec<NaiveDate> = store
        .report_days_since(&user.id, now - Duration::days(7), offset_hours(0))
        .unwrap();
    assert!(days.is_empty());
}

#[test]
fn test_early_bird_uses_local_offset() {
    let late_utc = Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let user = store.create_user("sinta", "Sinta").unwrap();
    store.record_report(&NewReport::new(user.id, "Jl. Asia").at(late_utc)).unwrap();

    let utc_engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());
    let unlocked = ids(&utc_engine.check_and_unlock_achievements(&user.id).unwrap());
    assert!(!unlocked.contains(&"early_bird".to_string()));

    // 06:30 in UTC+7
    let local_engine = AchievementEngine::new(
        store.clone(),
        AchievementPolicy {
            utc_offset: offset_hours(7),
            ..AchievementPolicy::default()
        },
    );
    let unlocked = ids(&local_engine.check_and_unlock_achievements(&user.id).unwrap());
    assert_eq!(unlocked, vec!["early_bird"]);
}

// ============================================================================
// Catalog and policy
// ============================================================================

#[test]
fn test_custom_catalog_needs_no_code() {
    let catalog = Catalog::from_toml_str(
        r#"
        [[achievement]]
        id = "pothole_pair"
        name = "Pothole Pair"
        description = "Submit two reports"
        badge_url = "/badges/pair.webp"
        category = "milestone"
        xp_reward = 30
        criterion = { kind = "report_count", at_least = 2 }

        [[achievement]]
        id = "assigned_once"
        name = "On The Job"
        description = "Have a report assigned to a worker"
        badge_url = "/badges/assigned.webp"
        category = "quality"
        criterion = { kind = "status_count", status = "assigned", at_least = 1 }
        "#,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &catalog);
    let engine = AchievementEngine::new(
        store.clone(),
        AchievementPolicy {
            award_xp_on_unlock: true,
            ..AchievementPolicy::default()
        },
    );
    let user = store.create_user("tono", "Tono").unwrap();

    store.record_report(&NewReport::new(user.id, "A").at(old_noon())).unwrap();
    store
        .record_report(&NewReport::new(user.id, "B").status(ReportStatus::Assigned).at(old_noon()))
        .unwrap();

    let unlocked = engine.check_and_unlock_achievements(&user.id).unwrap();
    assert_eq!(ids(&unlocked), vec!["pothole_pair", "assigned_once"]);
    assert_eq!(unlocked[0].xp_awarded, 30);
    assert_eq!(unlocked[1].xp_awarded, 0);
    assert_eq!(store.find_user(&user.id).unwrap().unwrap().total_xp, 30);

    let list = engine.get_user_achievements(&user.id).unwrap();
    assert_eq!(list.total_count, 2);
    assert_eq!(list.unlocked_count, 2);
}

#[test]
fn test_custom_catalog_replaces_seeded_reference() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, &Catalog::reference());
    let veteran = store.create_user("yanto", "Yanto").unwrap();
    store.record_report(&NewReport::new(veteran.id, "Jl. Asia Afrika").at(old_noon())).unwrap();
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());
    assert_eq!(ids(&engine.check_and_unlock_achievements(&veteran.id).unwrap()), vec!["first_report"]);

    // Same database file, new deployment with its own catalog
    let custom = Catalog::from_toml_str(
        r#"
        [[achievement]]
        id = "pothole_pair"
        name = "Pothole Pair"
        description = "Submit two reports"
        badge_url = "/badges/pair.webp"
        category = "milestone"
        xp_reward = 30
        criterion = { kind = "report_count", at_least = 2 }
        "#,
    )
    .unwrap();
    let summary = store.seed_catalog(&custom).unwrap();
    assert_eq!((summary.inserted, summary.retired, summary.removed), (1, 1, 11));

    let live: Vec<_> = store.definitions().unwrap().into_iter().map(|d| d.id).collect();
    assert_eq!(live, vec!["pothole_pair"]);

    let newcomer = store.create_user("lina", "Lina").unwrap();
    for road in ["Jl. Dago", "Jl. Riau"] {
        store.record_report(&NewReport::new(newcomer.id, road).at(old_noon())).unwrap();
    }
    let unlocked = engine.check_and_unlock_achievements(&newcomer.id).unwrap();
    assert_eq!(ids(&unlocked), vec!["pothole_pair"]);

    // The retired unlock stays in the veteran's history but not in the catalog view
    let history = engine.get_unlocked_achievements(&veteran.id).unwrap();
    assert_eq!(history.achievements.len(), 1);
    assert_eq!(history.achievements[0].id, "first_report");
    let listing = engine.get_user_achievements(&veteran.id).unwrap();
    assert_eq!(listing.total_count, 1);
}

// ============================================================================
// Failure handling
// ============================================================================

/// Delegates to SQLite, with switchable injected failures
struct FlakyStore {
    inner: SqliteStore,
    fail_roads: AtomicBool,
    fail_inserts: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::InvalidData("injected failure".to_string())
}

impl UserStore for FlakyStore {
    fn find_user(&self, user_id: &UserId) -> StoreResult<Option<UserRecord>> {
        self.inner.find_user(user_id)
    }

    fn add_xp(&self, user_id: &UserId, delta: u64, level_for: fn(u64) -> u32) -> StoreResult<Option<XpUpdate>> {
        self.inner.add_xp(user_id, delta, level_for)
    }

    fn top_users_by_xp(&self, limit: usize) -> StoreResult<Vec<UserRecord>> {
        self.inner.top_users_by_xp(limit)
    }
}

impl ReportAnalytics for FlakyStore {
    fn report_count(&self, user_id: &UserId) -> StoreResult<u64> {
        self.inner.report_count(user_id)
    }

    fn report_count_with_status(&self, user_id: &UserId, status: &str) -> StoreResult<u64> {
        self.inner.report_count_with_status(user_id, status)
    }

    fn distinct_road_count(&self, user_id: &UserId) -> StoreResult<u64> {
        if self.fail_roads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.distinct_road_count(user_id)
    }

    fn has_report_scoring_above(&self, user_id: &UserId, threshold: f64) -> StoreResult<bool> {
        self.inner.has_report_scoring_above(user_id, threshold)
    }

    fn has_report_with_class(&self, user_id: &UserId, class: &str) -> StoreResult<bool> {
        self.inner.has_report_with_class(user_id, class)
    }

    fn report_days_since(&self, user_id: &UserId, since: DateTime<Utc>, offset: FixedOffset) -> StoreResult<Vec<NaiveDate>> {
        self.inner.report_days_since(user_id, since, offset)
    }

    fn has_report_before_hour(&self, user_id: &UserId, hour: u32, offset: FixedOffset) -> StoreResult<bool> {
        self.inner.has_report_before_hour(user_id, hour, offset)
    }
}

impl AchievementStore for FlakyStore {
    fn definitions(&self) -> StoreResult<Vec<AchievementDefinition>> {
        self.inner.definitions()
    }

    fn unlocks_for_user(&self, user_id: &UserId) -> StoreResult<Vec<UnlockRecord>> {
        self.inner.unlocks_for_user(user_id)
    }

    fn has_unlock(&self, user_id: &UserId, achievement_id: &str) -> StoreResult<bool> {
        self.inner.has_unlock(user_id, achievement_id)
    }

    fn insert_unlock(
        &self,
        user_id: &UserId,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
        grant: Option<XpGrant>,
    ) -> StoreResult<UnlockOutcome> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_unlock(user_id, achievement_id, unlocked_at, grant)
    }
}

fn flaky_store() -> (Arc<FlakyStore>, UserId) {
    let inner = SqliteStore::open_in_memory().unwrap();
    inner.seed_catalog(&Catalog::reference()).unwrap();
    let user = inner.create_user("lia", "Lia").unwrap();
    for i in 0..5 {
        inner
            .record_report(&NewReport::new(user.id, &format!("Road {}", i)).at(old_noon()))
            .unwrap();
    }
    let store = FlakyStore {
        inner,
        fail_roads: AtomicBool::new(false),
        fail_inserts: AtomicBool::new(false),
    };
    (Arc::new(store), user.id)
}

#[test]
fn test_failed_metric_skips_only_its_criteria() {
    let (store, user_id) = flaky_store();
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());

    store.fail_roads.store(true, Ordering::SeqCst);
    let unlocked = ids(&engine.check_and_unlock_achievements(&user_id).unwrap());
    assert_eq!(unlocked, vec!["first_report", "road_warrior_5"]);

    // The skipped unlock is picked up once the query recovers
    store.fail_roads.store(false, Ordering::SeqCst);
    let unlocked = ids(&engine.check_and_unlock_achievements(&user_id).unwrap());
    assert_eq!(unlocked, vec!["street_explorer"]);
}

#[test]
fn test_insert_failure_propagates() {
    let (store, user_id) = flaky_store();
    let engine = AchievementEngine::new(store.clone(), AchievementPolicy::default());

    store.fail_inserts.store(true, Ordering::SeqCst);
    let err = engine.check_and_unlock_achievements(&user_id).unwrap_err();
    assert!(!err.is_not_found());
    assert!(store.inner.unlocks_for_user(&user_id).unwrap().is_empty());
}
