//! Dashboard command - library summary

use anyhow::Result;
use colored::Colorize;
use shelf_core::services::{BookLine, NotificationLevel};

use super::{get_context, require_session};
use crate::output;

fn print_lines(heading: &str, lines: &[BookLine]) {
    if lines.is_empty() {
        return;
    }
    println!();
    println!("{}", heading.bold());
    for line in lines {
        println!("  {} - {}", line.title, line.author.dimmed());
    }
}

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let session = require_session(&ctx)?;
    let summary = ctx.dashboard.summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", format!("Welcome, {}", session.admin().name).bold());
    println!();
    println!("  Books: {} total, {} available, {} borrowed",
        summary.total_books, summary.available_books, summary.borrowed_books);
    println!("  Overdue: {}", summary.overdue_books);
    println!("  Students: {} ({} with books out)", summary.total_students, summary.active_borrowers);

    for note in &summary.notifications {
        match note.level {
            NotificationLevel::Warning => output::warning(&note.message),
            NotificationLevel::Info => output::info(&note.message),
        }
    }

    print_lines("Recently added", &summary.recent_books);
    print_lines("Recently returned", &summary.recent_returns);
    print_lines("Overdue", &summary.overdue);
    Ok(())
}
