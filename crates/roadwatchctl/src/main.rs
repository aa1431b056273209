//! Roadwatch Control - operator CLI for the gamification database
//!
//! Seeds the achievement catalog, inspects and awards XP, runs achievement
//! checks and prints the leaderboard. Talks to the database directly.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roadwatchctl")]
#[command(about = "Roadwatch - reporter ranks and achievements", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $ROADWATCH_CONFIG, then user and system config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the achievement catalog into the database
    Seed,

    /// Create a reporter account
    AddUser {
        username: String,
        fullname: String,
    },

    /// Record a report for a user
    Report {
        user_id: String,
        road_name: String,

        /// Composite damage score
        #[arg(long, default_value_t = 0.0)]
        score: f64,

        /// Damage class (e.g. "Very Poor")
        #[arg(long)]
        class: Option<String>,
    },

    /// Mark a report as verified by an admin
    Verify {
        report_id: String,
    },

    /// Show a user's level, rank tier and progress
    Rank {
        user_id: String,
    },

    /// Award XP to a user
    Award {
        user_id: String,
        xp: u64,
    },

    /// Evaluate and unlock achievements for a user
    Check {
        user_id: String,
    },

    /// List a user's achievements
    Achievements {
        user_id: String,

        /// Only show unlocked achievements
        #[arg(long)]
        unlocked: bool,
    },

    /// Show the top users by XP
    Leaderboard {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the XP curve and rank tiers
    Curve,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = commands::CliContext::new(cli.config.as_deref(), cli.json);

    match cli.command {
        Commands::Seed => commands::seed(&ctx),
        Commands::AddUser { username, fullname } => commands::add_user(&ctx, &username, &fullname),
        Commands::Report { user_id, road_name, score, class } => {
            commands::report(&ctx, &user_id, &road_name, score, class.as_deref())
        }
        Commands::Verify { report_id } => commands::verify(&ctx, &report_id),
        Commands::Rank { user_id } => commands::rank(&ctx, &user_id),
        Commands::Award { user_id, xp } => commands::award(&ctx, &user_id, xp),
        Commands::Check { user_id } => commands::check(&ctx, &user_id),
        Commands::Achievements { user_id, unlocked } => {
            commands::achievements(&ctx, &user_id, unlocked)
        }
        Commands::Leaderboard { limit } => commands::leaderboard(&ctx, limit),
        Commands::Curve => commands::curve(&ctx),
    }
}
