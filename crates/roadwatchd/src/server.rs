//! HTTP server for roadwatchd

use crate::routes;
use anyhow::Result;
use axum::Router;
use roadwatch_common::config::GamificationConfig;
use roadwatch_common::{AchievementEngine, RankEngine, SqliteStore};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub ranks: RankEngine<SqliteStore>,
    pub achievements: AchievementEngine<SqliteStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, config: &GamificationConfig) -> Result<Self> {
        Ok(Self {
            ranks: RankEngine::new(store.clone(), config.limits()),
            achievements: AchievementEngine::new(store.clone(), config.policy()?),
            store,
            start_time: Instant::now(),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::rank_routes())
        .merge(routes::achievement_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C
pub async fn run(state: AppState, bind: &str) -> Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("  Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gracefully");
        })
        .await?;
    Ok(())
}
