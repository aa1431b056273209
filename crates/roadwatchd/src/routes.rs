//! API routes for roadwatchd
//!
//! Store access is blocking, so every handler hops onto the blocking pool.
//! Unknown users map to 404, malformed ids to 400, anything else to 500.
//! A 500 body never carries storage detail; that goes to the log.

use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use roadwatch_common::achievements::{AchievementList, NewAchievement};
use roadwatch_common::error::GamificationError;
use roadwatch_common::progression::{LeaderboardEntry, LevelUp, UserRank};
use roadwatch_common::store::{AchievementStore, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

type AppStateArc = Arc<AppState>;
type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

const INTERNAL_ERROR: &str = "Internal server error";

fn parse_user_id(raw: &str) -> Result<UserId, (StatusCode, String)> {
    UserId::parse_str(raw).map_err(|_| {
        warn!("  Rejected malformed user id: {}", raw);
        (StatusCode::BAD_REQUEST, format!("Invalid user id '{}'", raw))
    })
}

fn error_response(err: GamificationError) -> (StatusCode, String) {
    if err.is_not_found() {
        warn!("  {}", err);
        (StatusCode::NOT_FOUND, err.to_string())
    } else {
        error!("  Request failed ({}): {}", err.code(), err);
        (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string())
    }
}

/// Run engine work on the blocking pool
async fn blocking<T, F>(state: &AppStateArc, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> roadwatch_common::error::Result<T> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || work(state.as_ref()))
        .await
        .map_err(|e| {
            error!("  Worker task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string())
        })?
        .map(Json)
        .map_err(error_response)
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub achievements: usize,
}

async fn health(State(state): State<AppStateArc>) -> ApiResult<HealthResponse> {
    blocking(&state, |state| {
        let achievements = state.store.definitions()?.len();
        Ok(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            achievements,
        })
    })
    .await
}

// ============================================================================
// Rank Routes
// ============================================================================

pub fn rank_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/users/:id/rank", get(get_rank))
        .route("/v1/users/:id/xp", post(award_xp))
        .route("/v1/leaderboard", get(leaderboard))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AwardXpRequest {
    pub xp: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub limit: usize,
    pub entries: Vec<LeaderboardEntry>,
}

async fn get_rank(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> ApiResult<UserRank> {
    let user_id = parse_user_id(&id)?;
    blocking(&state, move |state| state.ranks.get_user_rank(&user_id)).await
}

async fn award_xp(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Json(req): Json<AwardXpRequest>,
) -> ApiResult<LevelUp> {
    let user_id = parse_user_id(&id)?;
    info!("  Awarding {} XP to {}", req.xp, user_id);
    blocking(&state, move |state| state.ranks.add_xp_to_user(&user_id, req.xp)).await
}

async fn leaderboard(
    State(state): State<AppStateArc>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<LeaderboardResponse> {
    blocking(&state, move |state| {
        let limit = state.ranks.limits().resolve(query.limit);
        let entries = state.ranks.get_leaderboard(Some(limit))?;
        Ok(LeaderboardResponse { limit, entries })
    })
    .await
}

// ============================================================================
// Achievement Routes
// ============================================================================

pub fn achievement_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/users/:id/achievements", get(list_achievements))
        .route("/v1/users/:id/achievements/unlocked", get(list_unlocked))
        .route("/v1/users/:id/achievements/check", post(check_achievements))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub count: usize,
    pub new_achievements: Vec<NewAchievement>,
}

async fn list_achievements(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> ApiResult<AchievementList> {
    let user_id = parse_user_id(&id)?;
    blocking(&state, move |state| state.achievements.get_user_achievements(&user_id)).await
}

async fn list_unlocked(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> ApiResult<AchievementList> {
    let user_id = parse_user_id(&id)?;
    blocking(&state, move |state| state.achievements.get_unlocked_achievements(&user_id)).await
}

async fn check_achievements(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> ApiResult<CheckResponse> {
    let user_id = parse_user_id(&id)?;
    blocking(&state, move |state| {
        let new_achievements = state.achievements.check_and_unlock_achievements(&user_id)?;
        Ok(CheckResponse {
            count: new_achievements.len(),
            new_achievements,
        })
    })
    .await
}
