//! Output formatting - plain ASCII tables with color accents

use crate::commands::CurveRow;
use owo_colors::OwoColorize;
use roadwatch_common::achievements::{AchievementList, NewAchievement};
use roadwatch_common::progression::{LeaderboardEntry, LevelUp, UserRank};
use roadwatch_common::store::{SeedSummary, UserRecord};
use std::path::Path;

const SEPARATOR: &str = "------------------------------------------------------------";

pub fn print_ok(message: &str) {
    println!("{} {}", "[OK]".bright_green(), message);
}

pub fn print_seed(summary: &SeedSummary, db: &Path) {
    print_ok(&format!(
        "Catalog seeded into {} ({} new, {} refreshed)",
        db.display(),
        summary.inserted,
        summary.updated
    ));
    if summary.retired + summary.removed > 0 {
        println!(
            "  dropped from catalog: {} removed, {} retired (still held by users)",
            summary.removed,
            summary.retired.yellow()
        );
    }
}

pub fn print_user(user: &UserRecord) {
    print_ok(&format!("Created {} ({})", user.username.bold(), user.fullname));
    println!("  id: {}", user.id.cyan());
}

/// Text progress bar, `width` cells wide
fn progress_bar(progress: f64, width: usize) -> String {
    let filled = ((progress / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

pub fn print_rank(rank: &UserRank) {
    println!();
    println!(
        "  Level {}  {}",
        rank.level.to_string().bold(),
        rank.rank_name.bright_yellow()
    );
    println!("  Total XP: {}", rank.total_xp);
    if rank.capped {
        println!("  {} {}", progress_bar(100.0, 30).bright_green(), "MAX LEVEL".bright_green());
    } else {
        println!(
            "  {} {:.2}%  ({} XP to level {})",
            progress_bar(rank.progress, 30).cyan(),
            rank.progress,
            rank.xp_to_next,
            rank.next_level
        );
    }
    println!();
}

pub fn print_level_up(result: &LevelUp) {
    print_ok(&format!("+{} XP", result.xp_gained));
    if result.leveled_up {
        println!(
            "  {} level {} -> {}",
            "LEVEL UP".bright_green().bold(),
            result.old_level,
            result.new_level
        );
    }
    if let Some(rank) = &result.new_rank_name {
        println!("  {} {}", "NEW RANK".bright_yellow().bold(), rank);
    }
}

pub fn print_new_achievements(unlocked: &[NewAchievement]) {
    if unlocked.is_empty() {
        println!("No new achievements.");
        return;
    }
    for a in unlocked {
        let xp = if a.xp_awarded > 0 {
            format!(" (+{} XP)", a.xp_awarded)
        } else {
            String::new()
        };
        println!("  {} {}{}", "[UNLOCKED]".bright_green(), a.name.bold(), xp);
        println!("     {}", a.description.dimmed());
    }
}

pub fn print_achievement_list(list: &AchievementList) {
    println!();
    println!("  Achievements: {}/{}", list.unlocked_count, list.total_count);
    println!("{}", SEPARATOR.dimmed());
    for a in &list.achievements {
        let marker = if a.unlocked {
            "[x]".bright_green().to_string()
        } else {
            "[ ]".dimmed().to_string()
        };
        println!(
            "  {} {:<22} {:<10} {}",
            marker,
            a.name,
            a.category.as_str(),
            a.unlocked_at.as_deref().unwrap_or("")
        );
    }
    println!();
}

pub fn print_leaderboard(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("Leaderboard is empty.");
        return;
    }
    println!();
    println!("  {:>3}  {:<24} {:>8}  {:>5}  {}", "#", "Name", "XP", "Level", "Rank");
    println!("{}", SEPARATOR.dimmed());
    for e in entries {
        let position = format!("{:>3}", e.position);
        let position = if e.position <= 3 {
            position.bright_yellow().to_string()
        } else {
            position
        };
        println!(
            "  {}  {:<24} {:>8}  {:>5}  {}",
            position, e.fullname, e.total_xp, e.level, e.rank_name
        );
    }
    println!();
}

pub fn print_curve(rows: &[CurveRow]) {
    println!();
    println!("  {:>5}  {:>8}  {:>10}  {}", "Level", "Cost", "Cumulative", "Rank");
    println!("{}", SEPARATOR.dimmed());
    for row in rows {
        println!(
            "  {:>5}  {:>8}  {:>10}  {}",
            row.level, row.xp_for_level, row.cumulative_xp, row.rank_name
        );
    }
    println!();
}
