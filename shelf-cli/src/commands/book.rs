//! Book commands - catalogue add, list, show, update

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use shelf_core::services::{Availability, BookFilter, BookPatch};
use shelf_core::Book;

use super::{get_context, require_session, text_or_prompt};
use crate::output;

#[derive(Subcommand)]
pub enum BookCommands {
    /// Add a book to the catalogue
    Add {
        /// Book title
        #[arg(long)]
        title: Option<String>,
        /// Author
        #[arg(long)]
        author: Option<String>,
        /// ISBN (dashes and spaces are ignored)
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Publication year
        #[arg(long)]
        year: Option<i32>,
        /// Number of copies
        #[arg(long, default_value = "1")]
        copies: i32,
        #[arg(long)]
        description: Option<String>,
        /// Cover image URL
        #[arg(long)]
        cover: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List and search books
    List {
        /// Match title or author
        #[arg(long, short)]
        search: Option<String>,
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Publication year
        #[arg(long)]
        year: Option<i32>,
        /// Only available books
        #[arg(long, conflicts_with = "borrowed")]
        available: bool,
        /// Only borrowed books
        #[arg(long)]
        borrowed: bool,
        /// Show the category and year lists instead
        #[arg(long)]
        facets: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one book
    Show {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit catalogue fields of a book
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        copies: Option<i32>,
        /// New description (empty string clears it)
        #[arg(long)]
        description: Option<String>,
        /// New cover image URL (empty string clears it)
        #[arg(long)]
        cover: Option<String>,
        /// Refuse the edit if the book is no longer at this version
        #[arg(long)]
        expect_version: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: BookCommands) -> Result<()> {
    let ctx = get_context()?;
    require_session(&ctx)?;

    match command {
        BookCommands::Add {
            title,
            author,
            isbn,
            category,
            year,
            copies,
            description,
            cover,
            json,
        } => {
            let title = text_or_prompt(title, "Title")?;
            let author = text_or_prompt(author, "Author")?;
            let isbn = text_or_prompt(isbn, "ISBN")?;

            let mut book = Book::new(title, author, isbn);
            book.category = category.unwrap_or_default();
            book.published_year = year.unwrap_or(0);
            book.copies = copies;
            book.description = description;
            book.cover_image = cover;

            let added = ctx.inventory.add_book(book)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&added)?);
            } else {
                output::success(&format!("Added '{}'", added.title));
                println!("  ID: {}", added.id);
                println!("  ISBN: {}", added.isbn);
            }
        }
        BookCommands::List {
            search,
            isbn,
            category,
            year,
            available,
            borrowed,
            facets,
            json,
        } => {
            if facets {
                let categories = ctx.inventory.categories()?;
                let years = ctx.inventory.published_years()?;
                if json {
                    println!(
                        "{}",
                        serde_json::json!({ "categories": categories, "years": years })
                    );
                } else {
                    println!("{} {}", "Categories:".bold(), categories.join(", "));
                    let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
                    println!("{} {}", "Years:".bold(), years.join(", "));
                }
                return Ok(());
            }

            let filter = BookFilter {
                text: search,
                isbn,
                category,
                availability: if available {
                    Some(Availability::Available)
                } else if borrowed {
                    Some(Availability::Borrowed)
                } else {
                    None
                },
                published_year: year,
            };
            let books = ctx.inventory.search(&filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&books)?);
                return Ok(());
            }
            if books.is_empty() {
                println!("No books found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["ID", "Title", "Author", "ISBN", "Category", "Status", "Due"]);
            for book in &books {
                let status = if book.available {
                    Cell::new("available").fg(Color::Green)
                } else {
                    Cell::new("borrowed").fg(Color::Yellow)
                };
                table.add_row(vec![
                    Cell::new(&book.id),
                    Cell::new(&book.title),
                    Cell::new(&book.author),
                    Cell::new(&book.isbn),
                    Cell::new(&book.category),
                    status,
                    Cell::new(output::format_optional_date(book.due_date)),
                ]);
            }
            println!("{}", table);
            println!("{} book(s)", books.len());
        }
        BookCommands::Show { id, json } => {
            let book = ctx.inventory.get_book(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&book)?);
                return Ok(());
            }
            print_book(&book);
        }
        BookCommands::Update {
            id,
            title,
            author,
            isbn,
            category,
            year,
            copies,
            description,
            cover,
            expect_version,
            json,
        } => {
            let patch = BookPatch {
                title,
                author,
                isbn,
                category,
                published_year: year,
                copies,
                description,
                cover_image: cover,
            };
            if patch.is_empty() {
                anyhow::bail!("Nothing to update. Pass at least one field, e.g. --title.");
            }
            let updated = ctx.inventory.patch_book(&id, &patch, expect_version)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&updated)?);
            } else {
                output::success(&format!("Updated '{}' (version {})", updated.title, updated.version));
            }
        }
    }

    Ok(())
}

fn print_book(book: &Book) {
    println!("{}", book.title.bold());
    println!("  ID: {}", book.id);
    println!("  Author: {}", book.author);
    println!("  ISBN: {}", book.isbn);
    if !book.category.is_empty() {
        println!("  Category: {}", book.category);
    }
    if book.published_year > 0 {
        println!("  Published: {}", book.published_year);
    }
    println!("  Copies: {}", book.copies);
    if let Some(description) = &book.description {
        println!("  Description: {}", description);
    }
    if book.available {
        println!("  Status: {}", "available".green());
    } else {
        println!("  Status: {}", "borrowed".yellow());
        if let Some(student) = &book.borrowed_by {
            println!("  Borrowed by: {}", student);
        }
        println!("  Due: {}", output::format_optional_date(book.due_date));
    }
    if let Some(returned) = book.return_date {
        println!("  Last returned: {}", output::format_date(returned));
    }
    println!("  Version: {}", book.version);
}
