//! Output formatting utilities

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use shelf_core::{Error, ErrorKind};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

pub fn format_optional_date(date: Option<DateTime<Utc>>) -> String {
    date.map(format_date).unwrap_or_else(|| "-".to_string())
}

/// One actionable line per failure kind
pub fn describe_error(err: &anyhow::Error) -> String {
    let Some(core) = err.downcast_ref::<Error>() else {
        return format!("{:#}", err);
    };
    let hint = match core.kind() {
        ErrorKind::DuplicateKey => "Use a different ISBN or id.",
        ErrorKind::NotFound => "Check the id with `shelf book list` or `shelf student list`.",
        ErrorKind::InvalidState => "Check the book's current status with `shelf book show`.",
        ErrorKind::Conflict => "The record changed since you read it. Reload and try again.",
        ErrorKind::Validation => "Fix the input and try again.",
        ErrorKind::Verification => "Run `shelf verify <admission-number>` and confirm the student.",
        ErrorKind::Unauthenticated => "Run `shelf login` with valid credentials.",
        ErrorKind::RegistryUnavailable => {
            "The school registry did not answer. Try again later or disable it in settings.json."
        }
        ErrorKind::StoreUnavailable => {
            "The library database could not be used. Close other shelf processes and retry."
        }
        ErrorKind::Config => "Fix settings.json in the shelf directory.",
        ErrorKind::Io | ErrorKind::Json => "Check the shelf directory permissions.",
    };
    format!("{}\n{}", core, hint)
}

/// Event-log text for a failure: the kind only, never record contents
pub fn error_label(err: &anyhow::Error) -> String {
    match err.downcast_ref::<Error>() {
        Some(core) => format!("{:?}", core.kind()),
        None => "Other".to_string(),
    }
}
