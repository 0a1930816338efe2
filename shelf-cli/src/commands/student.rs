//! Student commands - add and list

use anyhow::Result;
use clap::Subcommand;
use shelf_core::Student;

use super::{get_context, require_session, text_or_prompt};
use crate::output;

#[derive(Subcommand)]
pub enum StudentCommands {
    /// Add a student by hand
    Add {
        /// Admission number (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Full name
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        grade: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List students
    List {
        /// Match admission number, name or grade
        #[arg(long, short)]
        search: Option<String>,
        /// Only students with books out
        #[arg(long)]
        borrowers: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: StudentCommands) -> Result<()> {
    let ctx = get_context()?;
    require_session(&ctx)?;

    match command {
        StudentCommands::Add { id, name, grade, json } => {
            let name = text_or_prompt(name, "Name")?;
            let added = ctx
                .roster
                .add_student(Student::new(id.unwrap_or_default(), name, grade))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&added)?);
            } else {
                output::success(&format!("Added {} ({})", added.name, added.id));
            }
        }
        StudentCommands::List { search, borrowers, json } => {
            let students = if borrowers {
                ctx.lending.borrowers()?
            } else {
                ctx.roster.search(search.as_deref().unwrap_or(""))?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
                return Ok(());
            }
            if students.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Admission No.", "Name", "Grade", "Books out"]);
            for student in &students {
                table.add_row(vec![
                    student.id.clone(),
                    student.name.clone(),
                    student.grade.clone(),
                    student.borrowed_books.len().to_string(),
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
