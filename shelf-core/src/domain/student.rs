//! Student domain model

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use crate::ports::RegistryStudent;

/// A borrower. For registry-verified students the id is the school
/// admission number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Free-text grade label
    pub grade: String,
    /// Ids of books currently checked out by this student
    pub borrowed_books: BTreeSet<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>, grade: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            grade: grade.into(),
            borrowed_books: BTreeSet::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Map a registry record onto a fresh local student.
    /// The registry's enrollment status is not carried over.
    pub fn from_registry(record: &RegistryStudent) -> Self {
        Self::new(
            record.admission_number.trim(),
            record.name.trim(),
            record.grade.trim(),
        )
    }

    /// Union `book_ids` into the borrowed set, returns how many were new
    pub fn add_books<'a>(&mut self, book_ids: impl IntoIterator<Item = &'a String>) -> usize {
        book_ids
            .into_iter()
            .filter(|id| self.borrowed_books.insert((*id).clone()))
            .count()
    }

    pub fn remove_book(&mut self, book_id: &str) -> bool {
        self.borrowed_books.remove(book_id)
    }

    pub fn has_borrowed(&self) -> bool {
        !self.borrowed_books.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("student id cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("student name cannot be empty"));
        }
        Ok(())
    }
}
