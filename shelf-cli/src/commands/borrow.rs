//! Borrow command - lend books to one student

use std::io::{self, Read};
use std::process::exit;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use shelf_core::services::{BorrowRequest, LookupOutcome};

use super::verify::{lookup, print_verified};
use super::{get_context, require_session, text_or_prompt};
use crate::output;

pub fn run(student: Option<String>, name: Option<String>, ids: Vec<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let session = require_session(&ctx)?;

    // IDs from the flag, or piped on stdin
    let book_ids: Vec<String> = if ids.is_empty() && atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
            .split(|c: char| c == '\n' || c == ',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        ids
    };
    if book_ids.is_empty() {
        anyhow::bail!("No book IDs provided. Use --ids or pipe IDs from stdin.");
    }

    let admission_number = text_or_prompt(student, "Admission number")?;

    let verified = if ctx.verification.is_enabled() {
        match lookup(&ctx, &admission_number)? {
            LookupOutcome::Verified(v) => Some(v),
            LookupOutcome::NotFound => {
                anyhow::bail!("The school registry has no student with admission number {}", admission_number)
            }
            LookupOutcome::Superseded | LookupOutcome::Disabled => None,
        }
    } else {
        None
    };

    let student_name = match &verified {
        Some(v) => {
            if !json {
                print_verified(v);
                if atty::is(atty::Stream::Stdin)
                    && !Confirm::new()
                        .with_prompt("Lend to this student?")
                        .default(true)
                        .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            v.record.name.clone()
        }
        None => text_or_prompt(name, "Student name")?,
    };

    let request = BorrowRequest {
        admission_number,
        student_name,
        book_ids,
    };
    let result = ctx.lending.borrow(&session, &request, verified.as_ref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        if result.failed > 0 {
            exit(1);
        }
        return Ok(());
    }

    if result.succeeded > 0 {
        println!(
            "{} Lent {} book(s) to {} ({})",
            "✓".green(),
            result.succeeded,
            result.student_name,
            result.admission_number
        );
        println!("Due: {}", output::format_date(result.due_date));
        for entry in result.results.iter().filter(|e| e.success) {
            println!("  {}", entry.title.as_deref().unwrap_or(&entry.book_id));
        }
    }

    for warning in &result.warnings {
        output::warning(warning);
    }
    if let Some(error) = &result.student_error {
        output::error(&format!("Student record: {}", error));
    }

    if result.failed > 0 {
        println!();
        println!("{} Failed to lend {} book(s)", "✗".red(), result.failed);
        for entry in &result.results {
            if let Some(error) = &entry.error {
                println!("  {}: {}", entry.book_id, error);
            }
        }
        exit(1);
    }

    Ok(())
}
