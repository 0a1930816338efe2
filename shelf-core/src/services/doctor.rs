//! Doctor service - library health checks

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::result::Result;
use crate::domain::{Book, Loan, Student};
use crate::migrations::SCHEMA_VERSION;

const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin123";

/// Doctor service for health checks
pub struct DoctorService {
    store: Arc<DuckDbStore>,
}

impl DoctorService {
    pub fn new(store: Arc<DuckDbStore>) -> Self {
        Self { store }
    }

    pub fn run_checks(&self) -> Result<DoctorResult> {
        self.run_checks_at(Utc::now())
    }

    /// Run all health checks
    pub fn run_checks_at(&self, now: DateTime<Utc>) -> Result<DoctorResult> {
        let books = self.store.get_books()?;
        let students: HashMap<String, Student> = self
            .store
            .get_students()?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let open_loans = self.store.get_open_loans()?;

        let mut checks = BTreeMap::new();
        checks.insert("schema_version".to_string(), self.check_schema()?);
        checks.insert("lending_state".to_string(), check_lending_state(&books));
        checks.insert(
            "borrower_links".to_string(),
            check_borrower_links(&books, &students),
        );
        checks.insert("open_loans".to_string(), check_open_loans(&books, &open_loans));
        checks.insert("overdue_books".to_string(), check_overdue(&books, now));
        checks.insert("default_credentials".to_string(), self.check_credentials()?);

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary { passed, warnings, errors },
        })
    }

    fn check_schema(&self) -> Result<CheckResult> {
        let version = self.store.schema_version()?;
        let pending = self.store.pending_migrations()?;
        Ok(if pending.is_empty() {
            CheckResult::pass(format!("Schema is at version {}", version))
        } else {
            CheckResult::new(
                "warning",
                format!(
                    "Schema is at version {} of {}; {} migration(s) pending",
                    version,
                    SCHEMA_VERSION,
                    pending.len()
                ),
                pending.into_iter().map(|name| json!({ "migration": name })).collect(),
            )
        })
    }

    fn check_credentials(&self) -> Result<CheckResult> {
        let default_left = self
            .store
            .get_admin_by_username(DEFAULT_USERNAME)?
            .map(|admin| admin.password_matches(DEFAULT_PASSWORD))
            .unwrap_or(false);
        Ok(if default_left {
            CheckResult::new(
                "warning",
                "The default admin password is still in use; change it with `shelf password`",
                Vec::new(),
            )
        } else {
            CheckResult::pass("Default admin password has been changed")
        })
    }
}

fn check_lending_state(books: &[Book]) -> CheckResult {
    let broken: Vec<serde_json::Value> = books
        .iter()
        .filter(|b| !b.is_consistent())
        .map(|b| {
            json!({
                "book_id": b.id,
                "available": b.available,
                "has_borrower": b.borrowed_by.is_some(),
                "has_due_date": b.due_date.is_some(),
            })
        })
        .collect();
    if broken.is_empty() {
        CheckResult::pass("Every book is either available or borrowed with a due date")
    } else {
        CheckResult::new(
            "error",
            format!("{} book(s) have inconsistent lending fields", broken.len()),
            broken,
        )
    }
}

/// Book.borrowed_by and Student.borrowed_books must agree in both directions
fn check_borrower_links(books: &[Book], students: &HashMap<String, Student>) -> CheckResult {
    let mut details = Vec::new();

    for book in books.iter().filter(|b| b.is_borrowed()) {
        let Some(student_id) = book.borrowed_by.as_deref() else {
            continue;
        };
        match students.get(student_id) {
            None => details.push(json!({
                "book_id": book.id,
                "student_id": student_id,
                "problem": "borrower has no student record",
            })),
            Some(student) if !student.borrowed_books.contains(&book.id) => details.push(json!({
                "book_id": book.id,
                "student_id": student_id,
                "problem": "book missing from the student's borrowed list",
            })),
            Some(_) => {}
        }
    }

    let holders: HashMap<&str, Option<&str>> = books
        .iter()
        .map(|b| (b.id.as_str(), b.borrowed_by.as_deref()))
        .collect();
    let mut student_ids: Vec<&String> = students.keys().collect();
    student_ids.sort();
    for student_id in student_ids {
        for book_id in &students[student_id].borrowed_books {
            let problem = match holders.get(book_id.as_str()) {
                None => "listed book does not exist",
                Some(holder) if *holder != Some(student_id.as_str()) => {
                    "listed book is not borrowed by this student"
                }
                Some(_) => continue,
            };
            details.push(json!({
                "book_id": book_id,
                "student_id": student_id,
                "problem": problem,
            }));
        }
    }

    if details.is_empty() {
        CheckResult::pass("Books and student records agree on who holds what")
    } else {
        CheckResult::new(
            "error",
            format!("{} borrower link(s) disagree", details.len()),
            details,
        )
    }
}

fn check_open_loans(books: &[Book], open_loans: &[Loan]) -> CheckResult {
    let mut details = Vec::new();

    for book in books.iter().filter(|b| b.is_borrowed()) {
        if !open_loans.iter().any(|l| l.book_id == book.id) {
            details.push(json!({ "book_id": book.id, "problem": "borrowed without an open loan" }));
        }
    }
    for loan in open_loans {
        let still_out = books
            .iter()
            .any(|b| b.id == loan.book_id && b.is_borrowed());
        if !still_out {
            details.push(json!({
                "loan_id": loan.id,
                "book_id": loan.book_id,
                "problem": "open loan for a book that is not borrowed",
            }));
        }
    }

    if details.is_empty() {
        CheckResult::pass(format!("{} open loan(s) match the borrowed books", open_loans.len()))
    } else {
        CheckResult::new(
            "warning",
            format!("{} loan record(s) out of step with the books", details.len()),
            details,
        )
    }
}

fn check_overdue(books: &[Book], now: DateTime<Utc>) -> CheckResult {
    let overdue: Vec<serde_json::Value> = books
        .iter()
        .filter(|b| b.is_overdue(now))
        .map(|b| {
            json!({
                "book_id": b.id,
                "due_date": b.due_date.map(|d| d.to_rfc3339()),
                "days_overdue": b.due_date.map(|d| (now - d).num_days()),
            })
        })
        .collect();
    if overdue.is_empty() {
        CheckResult::pass("No overdue books")
    } else {
        CheckResult::new("warning", format!("{} book(s) are overdue", overdue.len()), overdue)
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: "pass".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn new(status: &str, message: impl Into<String>, details: Vec<serde_json::Value>) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
            details: if details.is_empty() { None } else { Some(details) },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
