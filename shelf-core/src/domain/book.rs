//! Book domain model and its lending state machine

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// A catalogued title.
///
/// A row carries a single availability flag even when `copies > 1`, so a
/// multi-copy title is either fully on the shelf or fully out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Normalized ISBN, unique across all books
    pub isbn: String,
    pub category: String,
    pub published_year: i32,
    pub copies: i32,
    pub description: Option<String>,
    /// Cover image URL
    pub cover_image: Option<String>,
    pub available: bool,
    /// Admission number of the current borrower
    pub borrowed_by: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Set by the most recent return
    pub return_date: Option<DateTime<Utc>>,
    /// Optimistic concurrency stamp, bumped by the store on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a book stands in the lending state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LendingState {
    Available,
    Borrowed {
        student_id: String,
        due_date: DateTime<Utc>,
    },
}

fn isbn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+X?$").expect("static ISBN pattern"))
}

fn isbn_separators() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\s-]+").expect("static separator pattern"))
}

impl Book {
    /// Create a new, available book with a fresh id
    pub fn new(title: impl Into<String>, author: impl Into<String>, isbn: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            author: author.into(),
            isbn: isbn.into(),
            category: String::new(),
            published_year: 0,
            copies: 1,
            description: None,
            cover_image: None,
            available: true,
            borrowed_by: None,
            due_date: None,
            return_date: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Strip spaces and hyphens, upper-case the check character
    pub fn normalize_isbn(isbn: &str) -> String {
        isbn_separators()
            .replace_all(isbn.trim(), "")
            .to_uppercase()
    }

    /// Derive the lending state; `None` when the invariant is broken
    pub fn lending_state(&self) -> Option<LendingState> {
        match (self.available, &self.borrowed_by, self.due_date) {
            (true, None, None) => Some(LendingState::Available),
            (false, Some(student_id), Some(due_date)) => Some(LendingState::Borrowed {
                student_id: student_id.clone(),
                due_date,
            }),
            _ => None,
        }
    }

    /// `available == false` iff `borrowed_by` is set iff `due_date` is set
    pub fn is_consistent(&self) -> bool {
        self.lending_state().is_some()
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.lending_state(), Some(LendingState::Borrowed { .. }))
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lending_state(), Some(LendingState::Borrowed { due_date, .. }) if due_date < now)
    }

    /// Available -> Borrowed. Leaves the book untouched on failure.
    pub fn mark_borrowed(&mut self, student_id: &str, due_date: DateTime<Utc>) -> Result<()> {
        match self.lending_state() {
            Some(LendingState::Available) => {
                self.available = false;
                self.borrowed_by = Some(student_id.to_string());
                self.due_date = Some(due_date);
                Ok(())
            }
            Some(LendingState::Borrowed { .. }) => Err(Error::invalid_state(format!(
                "'{}' is already borrowed",
                self.title
            ))),
            None => Err(Error::invalid_state(format!(
                "'{}' has inconsistent lending fields",
                self.title
            ))),
        }
    }

    /// Borrowed -> Available. Returns the previous borrower.
    pub fn mark_returned(&mut self, now: DateTime<Utc>) -> Result<String> {
        match self.lending_state() {
            Some(LendingState::Borrowed { student_id, .. }) => {
                self.available = true;
                self.borrowed_by = None;
                self.due_date = None;
                self.return_date = Some(now);
                Ok(student_id)
            }
            Some(LendingState::Available) => Err(Error::invalid_state(format!(
                "'{}' is not borrowed",
                self.title
            ))),
            None => Err(Error::invalid_state(format!(
                "'{}' has inconsistent lending fields",
                self.title
            ))),
        }
    }

    /// True when the lending fields of `other` differ from ours
    pub fn lending_fields_differ(&self, other: &Book) -> bool {
        self.available != other.available
            || self.borrowed_by != other.borrowed_by
            || self.due_date != other.due_date
            || self.return_date != other.return_date
    }

    /// Validate catalogue data
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("book id cannot be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(Error::validation("book title cannot be empty"));
        }
        if self.author.trim().is_empty() {
            return Err(Error::validation("book author cannot be empty"));
        }
        if !isbn_pattern().is_match(&self.isbn) {
            return Err(Error::validation(format!(
                "'{}' is not a valid ISBN (digits with an optional final X)",
                self.isbn
            )));
        }
        if self.copies < 1 {
            return Err(Error::validation("copies must be at least 1"));
        }
        if !self.is_consistent() {
            return Err(Error::validation(
                "a book is unavailable exactly when it has a borrower and a due date",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> Book {
        Book::new("Dune", "Frank Herbert", "9780441013593")
    }

    #[test]
    fn test_isbn_normalization() {
        assert_eq!(Book::normalize_isbn(" 978-0-13-468599-1 "), "9780134685991");
        assert_eq!(Book::normalize_isbn("0 8044 2957 x"), "080442957X");
        assert_eq!(Book::normalize_isbn("111"), "111");
    }

    #[test]
    fn test_new_book_is_available() {
        let book = sample();
        assert_eq!(book.lending_state(), Some(LendingState::Available));
        assert!(book.validate().is_ok());
    }

    #[test]
    fn test_borrow_and_return_round() {
        let mut book = sample();
        let due = Utc::now() + Duration::days(14);
        book.mark_borrowed("S100", due).unwrap();
        assert!(!book.available);
        assert_eq!(book.borrowed_by.as_deref(), Some("S100"));
        assert_eq!(book.due_date, Some(due));
        assert!(book.is_consistent());

        let now = Utc::now();
        let previous = book.mark_returned(now).unwrap();
        assert_eq!(previous, "S100");
        assert!(book.available);
        assert!(book.borrowed_by.is_none());
        assert!(book.due_date.is_none());
        assert_eq!(book.return_date, Some(now));
    }

    #[test]
    fn test_double_borrow_leaves_book_unchanged() {
        let mut book = sample();
        book.mark_borrowed("S100", Utc::now()).unwrap();
        let before = book.clone();

        let err = book.mark_borrowed("S200", Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(book, before);
    }

    #[test]
    fn test_return_available_book_is_invalid() {
        let mut book = sample();
        let before = book.clone();
        let err = book.mark_returned(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(book, before);
    }

    #[test]
    fn test_inconsistent_book_fails_validation() {
        let mut book = sample();
        book.available = false;
        assert!(!book.is_consistent());
        assert!(book.validate().is_err());
        assert!(book.mark_borrowed("S1", Utc::now()).is_err());
    }

    #[test]
    fn test_overdue() {
        let mut book = sample();
        let now = Utc::now();
        book.mark_borrowed("S1", now - Duration::days(1)).unwrap();
        assert!(book.is_overdue(now));
        assert!(!book.is_overdue(now - Duration::days(2)));
    }

    #[test]
    fn test_validation_rejects_bad_isbn_and_copies() {
        let mut book = sample();
        book.isbn = "97-80X1".to_string();
        assert!(book.validate().is_err());

        let mut book = sample();
        book.copies = 0;
        assert!(book.validate().is_err());
    }
}
