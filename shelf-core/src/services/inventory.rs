//! Inventory service - the book catalogue

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::result::{Error, Result};
use crate::domain::Book;

/// Field-level edit of catalogue data. Lending fields are not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub published_year: Option<i32>,
    pub copies: Option<i32>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.isbn.is_none()
            && self.category.is_none()
            && self.published_year.is_none()
            && self.copies.is_none()
            && self.description.is_none()
            && self.cover_image.is_none()
    }

    fn apply(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.trim().to_string();
        }
        if let Some(author) = &self.author {
            book.author = author.trim().to_string();
        }
        if let Some(isbn) = &self.isbn {
            book.isbn = isbn.clone();
        }
        if let Some(category) = &self.category {
            book.category = category.trim().to_string();
        }
        if let Some(year) = self.published_year {
            book.published_year = year;
        }
        if let Some(copies) = self.copies {
            book.copies = copies;
        }
        // An empty string clears the optional text fields
        if let Some(description) = &self.description {
            book.description = non_empty(description);
        }
        if let Some(cover_image) = &self.cover_image {
            book.cover_image = non_empty(cover_image);
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Borrowed,
}

/// Catalogue search. Every set field must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFilter {
    /// Case-insensitive match on title or author
    pub text: Option<String>,
    /// Substring of the normalized ISBN
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub availability: Option<Availability>,
    pub published_year: Option<i32>,
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = text.to_lowercase();
            if !book.title.to_lowercase().contains(&needle)
                && !book.author.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(isbn) = self.isbn.as_deref().filter(|i| !i.trim().is_empty()) {
            if !book.isbn.contains(&Book::normalize_isbn(isbn)) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !book.category.eq_ignore_ascii_case(category.trim()) {
                return false;
            }
        }
        match self.availability {
            Some(Availability::Available) if !book.available => return false,
            Some(Availability::Borrowed) if book.available => return false,
            _ => {}
        }
        if let Some(year) = self.published_year {
            if book.published_year != year {
                return false;
            }
        }
        true
    }
}

/// Book catalogue operations. There is no delete.
pub struct InventoryService {
    store: Arc<DuckDbStore>,
}

impl InventoryService {
    pub fn new(store: Arc<DuckDbStore>) -> Self {
        Self { store }
    }

    /// Add a book to the catalogue.
    ///
    /// The new book is always available, whatever lending fields the caller
    /// set. An empty id gets a fresh UUID; `copies` below 1 becomes 1.
    pub fn add_book(&self, mut book: Book) -> Result<Book> {
        if book.id.trim().is_empty() {
            book.id = Uuid::new_v4().to_string();
        }
        book.title = book.title.trim().to_string();
        book.author = book.author.trim().to_string();
        book.category = book.category.trim().to_string();
        book.isbn = Book::normalize_isbn(&book.isbn);
        if book.copies < 1 {
            book.copies = 1;
        }
        book.available = true;
        book.borrowed_by = None;
        book.due_date = None;
        book.return_date = None;
        book.version = 1;
        let now = Utc::now();
        book.created_at = now;
        book.updated_at = now;

        book.validate()?;

        if self.store.get_book_by_isbn(&book.isbn)?.is_some() {
            return Err(Error::DuplicateKey(format!(
                "a book with ISBN {} already exists",
                book.isbn
            )));
        }

        self.store.add_book(&book)?;
        Ok(book)
    }

    pub fn get_book(&self, id: &str) -> Result<Book> {
        self.store
            .get_book(id)?
            .ok_or_else(|| Error::not_found(format!("book {}", id)))
    }

    pub fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        self.store.get_book_by_isbn(&Book::normalize_isbn(isbn))
    }

    pub fn get_books(&self) -> Result<Vec<Book>> {
        self.store.get_books()
    }

    /// Replace a book's catalogue data.
    ///
    /// `book.version` must match the stored version (`Conflict` otherwise).
    /// Lending fields can only change through borrow and return.
    pub fn update_book(&self, book: &Book) -> Result<Book> {
        let mut book = book.clone();
        book.isbn = Book::normalize_isbn(&book.isbn);
        book.validate()?;

        let current = self.get_book(&book.id)?;
        if current.lending_fields_differ(&book) {
            return Err(Error::invalid_state(
                "availability, borrower and dates change only through borrow and return",
            ));
        }

        if current.isbn != book.isbn {
            if let Some(other) = self.store.get_book_by_isbn(&book.isbn)? {
                if other.id != book.id {
                    return Err(Error::DuplicateKey(format!(
                        "a book with ISBN {} already exists",
                        book.isbn
                    )));
                }
            }
        }

        book.created_at = current.created_at;
        self.store.put_book(&book)
    }

    /// Apply a partial edit on top of the stored record.
    ///
    /// With `expected_version` set, the edit is refused when the book has
    /// moved on since the caller read it.
    pub fn patch_book(
        &self,
        id: &str,
        patch: &BookPatch,
        expected_version: Option<i64>,
    ) -> Result<Book> {
        let mut book = self.get_book(id)?;
        if let Some(expected) = expected_version {
            if expected != book.version {
                return Err(Error::Conflict(format!(
                    "book {} is at version {}, edit was based on version {}",
                    id, book.version, expected
                )));
            }
        }
        if patch.is_empty() {
            return Ok(book);
        }
        patch.apply(&mut book);
        self.update_book(&book)
    }

    pub fn search(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        Ok(self
            .store
            .get_books()?
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect())
    }

    /// Distinct non-empty categories, sorted
    pub fn categories(&self) -> Result<Vec<String>> {
        let categories: BTreeSet<String> = self
            .store
            .get_books()?
            .into_iter()
            .map(|b| b.category)
            .filter(|c| !c.is_empty())
            .collect();
        Ok(categories.into_iter().collect())
    }

    /// Distinct publication years, newest first
    pub fn published_years(&self) -> Result<Vec<i32>> {
        let years: BTreeSet<i32> = self
            .store
            .get_books()?
            .into_iter()
            .map(|b| b.published_year)
            .filter(|y| *y > 0)
            .collect();
        Ok(years.into_iter().rev().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> InventoryService {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        store.ensure_schema().unwrap();
        InventoryService::new(store)
    }

    fn book(title: &str, author: &str, isbn: &str, category: &str, year: i32) -> Book {
        let mut book = Book::new(title, author, isbn);
        book.category = category.to_string();
        book.published_year = year;
        book
    }

    #[test]
    fn test_add_book_forces_available() {
        let service = service();
        let mut input = Book::new("Dune", "Frank Herbert", "978-0-441-01359-3");
        input.id = String::new();
        input.copies = 0;
        input.available = false;
        input.borrowed_by = Some("S1".to_string());
        input.due_date = Some(Utc::now() + Duration::days(3));

        let added = service.add_book(input).unwrap();
        assert!(!added.id.is_empty());
        assert_eq!(added.isbn, "9780441013593");
        assert_eq!(added.copies, 1);
        assert!(added.available);
        assert!(added.borrowed_by.is_none());
        assert!(added.due_date.is_none());
        assert_eq!(service.get_book(&added.id).unwrap().title, "Dune");
    }

    #[test]
    fn test_add_book_rejects_duplicate_isbn() {
        let service = service();
        service.add_book(Book::new("A", "X", "978-0134685991")).unwrap();
        let err = service.add_book(Book::new("B", "Y", "9780134685991")).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
        assert_eq!(service.get_books().unwrap().len(), 1);
    }

    #[test]
    fn test_add_book_validates() {
        let service = service();
        assert!(matches!(
            service.add_book(Book::new("", "X", "111")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.add_book(Book::new("T", "X", "ISBN-ABC")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_update_rejects_lending_changes_and_stale_versions() {
        let service = service();
        let added = service.add_book(Book::new("Dune", "Frank Herbert", "111")).unwrap();

        let mut sneaky = added.clone();
        sneaky.mark_borrowed("S100", Utc::now()).unwrap();
        assert!(matches!(service.update_book(&sneaky), Err(Error::InvalidState(_))));

        let mut broken = added.clone();
        broken.available = false;
        assert!(matches!(service.update_book(&broken), Err(Error::Validation(_))));

        let mut edit = added.clone();
        edit.title = "Dune (Deluxe)".to_string();
        let stored = service.update_book(&edit).unwrap();
        assert_eq!(stored.version, 2);

        assert!(matches!(service.update_book(&edit), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_patch_book() {
        let service = service();
        let added = service.add_book(Book::new("Dune", "Frank Herbert", "111")).unwrap();

        let patch = BookPatch {
            category: Some("Fiction".to_string()),
            description: Some("Spice".to_string()),
            ..Default::default()
        };
        let patched = service.patch_book(&added.id, &patch, Some(1)).unwrap();
        assert_eq!(patched.category, "Fiction");
        assert_eq!(patched.description.as_deref(), Some("Spice"));
        assert_eq!(patched.title, "Dune");

        let err = service.patch_book(&added.id, &patch, Some(1)).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let clear = BookPatch {
            description: Some(String::new()),
            ..Default::default()
        };
        let cleared = service.patch_book(&added.id, &clear, None).unwrap();
        assert!(cleared.description.is_none());
    }

    #[test]
    fn test_patch_isbn_collision() {
        let service = service();
        service.add_book(Book::new("A", "X", "111")).unwrap();
        let b = service.add_book(Book::new("B", "Y", "222")).unwrap();

        let patch = BookPatch {
            isbn: Some("1-1-1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.patch_book(&b.id, &patch, None),
            Err(Error::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_search_and_facets() {
        let service = service();
        service.add_book(book("Dune", "Frank Herbert", "111", "Fiction", 1965)).unwrap();
        service.add_book(book("Cosmos", "Carl Sagan", "222", "Science", 1980)).unwrap();
        service.add_book(book("Contact", "Carl Sagan", "333", "Fiction", 1985)).unwrap();

        let by_author = service
            .search(&BookFilter {
                text: Some("sagan".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_author.len(), 2);

        let fiction_1985 = service
            .search(&BookFilter {
                category: Some("fiction".to_string()),
                published_year: Some(1985),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(fiction_1985.len(), 1);
        assert_eq!(fiction_1985[0].title, "Contact");

        let borrowed = service
            .search(&BookFilter {
                availability: Some(Availability::Borrowed),
                ..Default::default()
            })
            .unwrap();
        assert!(borrowed.is_empty());

        assert_eq!(service.categories().unwrap(), vec!["Fiction", "Science"]);
        assert_eq!(service.published_years().unwrap(), vec![1985, 1980, 1965]);
    }
}
