//! Loan ledger entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One borrow of one book, closed when the book comes back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub book_id: String,
    pub student_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    /// Username of the staff member who issued the book
    pub issued_by: String,
    pub received_by: Option<String>,
}

impl Loan {
    pub fn open(
        book_id: impl Into<String>,
        student_id: impl Into<String>,
        borrowed_at: DateTime<Utc>,
        due_date: DateTime<Utc>,
        issued_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.into(),
            student_id: student_id.into(),
            borrowed_at,
            due_date,
            returned_at: None,
            issued_by: issued_by.into(),
            received_by: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    /// Open and past due, or returned after the due date
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.returned_at {
            Some(returned_at) => returned_at > self.due_date,
            None => now > self.due_date,
        }
    }
}
