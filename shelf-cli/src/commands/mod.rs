//! CLI command implementations

pub mod auth;
pub mod book;
pub mod borrow;
pub mod dashboard;
pub mod doctor;
pub mod loans;
pub mod logs;
pub mod return_book;
pub mod student;
pub mod verify;

use std::path::PathBuf;

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use shelf_core::{EntryPoint, LogEvent, LoggingService, Session, ShelfContext};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let shelf_dir = get_shelf_dir().ok()?;
    std::fs::create_dir_all(&shelf_dir).ok()?;
    LoggingService::new(&shelf_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the library directory from environment or default
pub fn get_shelf_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SHELF_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".shelf"))
        .context("Could not find home directory; set SHELF_DIR")
}

/// Open the library in the shelf directory
pub fn get_context() -> Result<ShelfContext> {
    let shelf_dir = get_shelf_dir()?;
    std::fs::create_dir_all(&shelf_dir)
        .with_context(|| format!("Failed to create shelf directory: {:?}", shelf_dir))?;
    ShelfContext::new(&shelf_dir).context("Failed to open the library")
}

/// The logged-in librarian, or a hint to log in
pub fn require_session(ctx: &ShelfContext) -> Result<Session> {
    ctx.auth
        .current_session()?
        .context("Not logged in. Run `shelf login` first.")
}

/// Use `value` when given, otherwise ask on the terminal
pub fn text_or_prompt(value: Option<String>, prompt: &str) -> Result<String> {
    if let Some(v) = value {
        return Ok(v);
    }
    if atty::isnt(atty::Stream::Stdin) {
        anyhow::bail!("{} is required", prompt);
    }
    Ok(Input::new().with_prompt(prompt).interact_text()?)
}

/// Use `value` when given, otherwise ask without echo
pub fn password_or_prompt(value: Option<String>, prompt: &str) -> Result<String> {
    if let Some(v) = value {
        return Ok(v);
    }
    if atty::isnt(atty::Stream::Stdin) {
        anyhow::bail!("{} is required", prompt);
    }
    Ok(Password::new().with_prompt(prompt).interact()?)
}

/// A tokio runtime for registry lookups.
///
/// Build the context before this and run blocking store calls outside
/// `block_on`.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}
