//! Dashboard service - counts and recent activity for the home screen

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::result::Result;
use crate::domain::Book;

const RECENT_LIMIT: usize = 5;

/// Books due within this window show up as reminders
const DUE_SOON_DAYS: i64 = 2;

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_books: i64,
    pub available_books: i64,
    pub borrowed_books: i64,
    pub overdue_books: i64,
    pub total_students: i64,
    pub active_borrowers: i64,
    pub recent_books: Vec<BookLine>,
    pub recent_returns: Vec<BookLine>,
    pub overdue: Vec<BookLine>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookLine {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrowed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<DateTime<Utc>>,
}

impl From<&Book> for BookLine {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            borrowed_by: book.borrowed_by.clone(),
            due_date: book.due_date,
            return_date: book.return_date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

pub struct DashboardService {
    store: Arc<DuckDbStore>,
}

impl DashboardService {
    pub fn new(store: Arc<DuckDbStore>) -> Self {
        Self { store }
    }

    pub fn summary(&self) -> Result<DashboardSummary> {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> Result<DashboardSummary> {
        let books = self.store.get_books()?;
        let students = self.store.get_students()?;

        let borrowed: Vec<&Book> = books.iter().filter(|b| b.is_borrowed()).collect();
        let mut overdue: Vec<&Book> = borrowed.iter().copied().filter(|b| b.is_overdue(now)).collect();
        overdue.sort_by_key(|b| b.due_date);

        let due_soon = borrowed
            .iter()
            .filter(|b| {
                b.due_date
                    .map(|due| due >= now && due <= now + Duration::days(DUE_SOON_DAYS))
                    .unwrap_or(false)
            })
            .count();

        let mut recent: Vec<&Book> = books.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut returned: Vec<&Book> = books
            .iter()
            .filter(|b| b.available && b.return_date.is_some())
            .collect();
        returned.sort_by(|a, b| b.return_date.cmp(&a.return_date));

        let mut notifications = Vec::new();
        if !overdue.is_empty() {
            notifications.push(Notification {
                level: NotificationLevel::Warning,
                message: format!("{} book(s) are overdue", overdue.len()),
            });
        }
        if due_soon > 0 {
            notifications.push(Notification {
                level: NotificationLevel::Info,
                message: format!("{} book(s) are due within {} days", due_soon, DUE_SOON_DAYS),
            });
        }

        Ok(DashboardSummary {
            total_books: books.len() as i64,
            available_books: books.iter().filter(|b| b.available).count() as i64,
            borrowed_books: borrowed.len() as i64,
            overdue_books: overdue.len() as i64,
            total_students: students.len() as i64,
            active_borrowers: students.iter().filter(|s| s.has_borrowed()).count() as i64,
            recent_books: recent.into_iter().take(RECENT_LIMIT).map(BookLine::from).collect(),
            recent_returns: returned.into_iter().take(RECENT_LIMIT).map(BookLine::from).collect(),
            overdue: overdue.into_iter().map(BookLine::from).collect(),
            notifications,
        })
    }
}
