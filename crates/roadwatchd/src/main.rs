//! Roadwatch Daemon - gamification API for road damage reporters
//!
//! Opens the database, seeds the achievement catalog and serves the
//! rank, leaderboard and achievement endpoints.

use anyhow::{Context, Result};
use roadwatch_common::{RoadwatchConfig, SqliteStore};
use roadwatchd::server::{self, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Roadwatch Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = RoadwatchConfig::load(None)?;
    let catalog = config.gamification.catalog()?;

    let store = SqliteStore::open(&config.database.path, config.database.busy_timeout())
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
    info!("  Database: {}", store.path().display());

    store.seed_catalog(&catalog).context("Failed to seed achievement catalog")?;

    let state = AppState::new(Arc::new(store), &config.gamification)?;
    if state.achievements.policy().award_xp_on_unlock {
        info!("  Achievement unlocks award XP");
    }

    server::run(state, &config.server.bind).await
}
