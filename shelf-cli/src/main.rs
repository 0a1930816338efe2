//! Shelf CLI - school library lending in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use shelf_core::LogEvent;

mod commands;
mod output;

use commands::{auth, book, borrow, dashboard, doctor, get_logger, loans, log_event, logs, return_book, student, verify};

/// Shelf - school library lending in your terminal
#[derive(Parser)]
#[command(name = "shelf", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in as a librarian
    Login {
        /// Username (prompted when omitted)
        username: Option<String>,
        /// Password (prompted when omitted)
        #[arg(long, env = "SHELF_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// End the current session
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the logged-in librarian
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change your password
    Password {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the book catalogue
    Book {
        #[command(subcommand)]
        command: book::BookCommands,
    },

    /// Manage students
    Student {
        #[command(subcommand)]
        command: student::StudentCommands,
    },

    /// Look up an admission number in the school registry
    Verify {
        admission_number: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Lend books to a student
    Borrow {
        /// Student admission number
        #[arg(long, short)]
        student: Option<String>,
        /// Student name (the registry's name wins when verification is on)
        #[arg(long, short)]
        name: Option<String>,
        /// Book IDs to lend
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Take a borrowed book back
    Return {
        book_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List books that are out
    Loans {
        /// Only overdue books
        #[arg(long)]
        overdue: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show library summary
    Dashboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run library health checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Login { .. } => "login",
            Commands::Logout { .. } => "logout",
            Commands::Whoami { .. } => "whoami",
            Commands::Password { .. } => "password",
            Commands::Book { .. } => "book",
            Commands::Student { .. } => "student",
            Commands::Verify { .. } => "verify",
            Commands::Borrow { .. } => "borrow",
            Commands::Return { .. } => "return",
            Commands::Loans { .. } => "loans",
            Commands::Dashboard { .. } => "dashboard",
            Commands::Doctor { .. } => "doctor",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.name();

    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_run").with_command(command));

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("command_failed")
                    .with_command(command)
                    .with_error(output::error_label(&e)),
            );
            output::error(&output::describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Login { username, password, json } => auth::login(username, password, json),
        Commands::Logout { json } => auth::logout(json),
        Commands::Whoami { json } => auth::whoami(json),
        Commands::Password { json } => auth::change_password(json),
        Commands::Book { command } => book::run(command),
        Commands::Student { command } => student::run(command),
        Commands::Verify { admission_number, json } => verify::run(&admission_number, json),
        Commands::Borrow { student, name, ids, json } => borrow::run(student, name, ids, json),
        Commands::Return { book_id, json } => return_book::run(&book_id, json),
        Commands::Loans { overdue, json } => loans::run(overdue, json),
        Commands::Dashboard { json } => dashboard::run(json),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Logs { command } => logs::run(command),
    }
}
