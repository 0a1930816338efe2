//! Return command - take a borrowed book back

use anyhow::Result;
use colored::Colorize;

use super::{get_context, require_session};
use crate::output;

pub fn run(book_id: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let session = require_session(&ctx)?;

    let receipt = ctx.lending.return_book(&session, book_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
        return Ok(());
    }

    println!("{} Returned '{}'", "✓".green(), receipt.title);
    println!("  From: {}", receipt.student_id);
    if receipt.was_overdue {
        output::warning(&format!("  {} day(s) overdue", receipt.days_overdue));
    }
    for warning in &receipt.warnings {
        output::warning(warning);
    }
    if let Some(error) = &receipt.student_error {
        output::error(&format!("Student record not updated: {}", error));
    }
    Ok(())
}
