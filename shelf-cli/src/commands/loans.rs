//! Loans command - books that are out

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Color};

use super::{get_context, require_session};
use crate::output;

pub fn run(overdue_only: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    require_session(&ctx)?;

    let now = Utc::now();
    let loans = if overdue_only {
        ctx.lending.overdue(now)?
    } else {
        ctx.lending.outstanding_at(now)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&loans)?);
        return Ok(());
    }
    if loans.is_empty() {
        println!("{}", if overdue_only { "No overdue books." } else { "No books are out." });
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Book ID", "Title", "Student", "Borrowed", "Due"]);
    for item in &loans {
        let student = match (&item.student, &item.book.borrowed_by) {
            (Some(s), _) => format!("{} ({})", s.name, s.id),
            (None, Some(id)) => id.clone(),
            (None, None) => "-".to_string(),
        };
        let due = output::format_optional_date(item.book.due_date);
        let due_cell = if item.overdue {
            Cell::new(format!("{} (overdue)", due)).fg(Color::Red)
        } else {
            Cell::new(due)
        };
        table.add_row(vec![
            Cell::new(&item.book.id),
            Cell::new(&item.book.title),
            Cell::new(student),
            Cell::new(output::format_optional_date(item.loan.as_ref().map(|l| l.borrowed_at))),
            due_cell,
        ]);
    }
    println!("{}", table);
    Ok(())
}
