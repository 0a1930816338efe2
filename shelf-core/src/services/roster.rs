//! Roster service - students and their borrowed-book sets

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::result::{Error, Result};
use crate::domain::Student;

pub struct RosterService {
    store: Arc<DuckDbStore>,
}

impl RosterService {
    pub fn new(store: Arc<DuckDbStore>) -> Self {
        Self { store }
    }

    /// Add a student by hand. An empty id gets a fresh UUID.
    pub fn add_student(&self, mut student: Student) -> Result<Student> {
        student.id = student.id.trim().to_string();
        if student.id.is_empty() {
            student.id = Uuid::new_v4().to_string();
        }
        student.name = student.name.trim().to_string();
        student.grade = student.grade.trim().to_string();
        student.borrowed_books.clear();
        student.version = 1;
        let now = Utc::now();
        student.created_at = now;
        student.updated_at = now;

        student.validate()?;

        if self.store.get_student(&student.id)?.is_some() {
            return Err(Error::DuplicateKey(format!(
                "student {} already exists",
                student.id
            )));
        }

        self.store.add_student(&student)?;
        Ok(student)
    }

    pub fn get_student(&self, id: &str) -> Result<Student> {
        self.find_student(id)?
            .ok_or_else(|| Error::not_found(format!("student {}", id)))
    }

    pub fn find_student(&self, id: &str) -> Result<Option<Student>> {
        self.store.get_student(id.trim())
    }

    pub fn get_students(&self) -> Result<Vec<Student>> {
        self.store.get_students()
    }

    /// Replace a student's profile (name, grade), guarded by version.
    /// The borrowed set belongs to the lending workflow.
    pub fn update_student(&self, student: &Student) -> Result<Student> {
        student.validate()?;
        let current = self.get_student(&student.id)?;
        if current.borrowed_books != student.borrowed_books {
            return Err(Error::invalid_state(
                "borrowed books change only through borrow and return",
            ));
        }
        let mut student = student.clone();
        student.created_at = current.created_at;
        self.store.put_student(&student)
    }

    /// Exact name lookup through the name index
    pub fn find_by_name(&self, name: &str) -> Result<Vec<Student>> {
        self.store.get_students_by_name(name.trim())
    }

    /// Case-insensitive match on id, name or grade
    pub fn search(&self, query: &str) -> Result<Vec<Student>> {
        let needle = query.trim().to_lowercase();
        let students = self.store.get_students()?;
        if needle.is_empty() {
            return Ok(students);
        }
        Ok(students
            .into_iter()
            .filter(|s| {
                s.id.to_lowercase().contains(&needle)
                    || s.name.to_lowercase().contains(&needle)
                    || s.grade.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Students with at least one book out
    pub fn borrowers(&self) -> Result<Vec<Student>> {
        Ok(self
            .store
            .get_students()?
            .into_iter()
            .filter(Student::has_borrowed)
            .collect())
    }

    /// Upsert `profile` and union `book_ids` into its borrowed set.
    ///
    /// An existing record takes the profile's name and grade (when given)
    /// and keeps every book it already had.
    pub fn record_borrowed(&self, profile: &Student, book_ids: &[String]) -> Result<Student> {
        let mut student = match self.store.get_student(&profile.id)? {
            Some(mut existing) => {
                if !profile.name.trim().is_empty() {
                    existing.name = profile.name.trim().to_string();
                }
                if !profile.grade.trim().is_empty() {
                    existing.grade = profile.grade.trim().to_string();
                }
                existing
            }
            None => {
                let mut fresh = Student::new(
                    profile.id.trim(),
                    profile.name.trim(),
                    profile.grade.trim(),
                );
                fresh.validate()?;
                fresh
            }
        };
        student.add_books(book_ids);
        self.store.put_student(&student)
    }

    /// Drop one book from a student's borrowed set.
    /// `None` when the student does not exist.
    pub fn record_returned(&self, student_id: &str, book_id: &str) -> Result<Option<Student>> {
        let Some(mut student) = self.store.get_student(student_id)? else {
            return Ok(None);
        };
        if !student.remove_book(book_id) {
            return Ok(Some(student));
        }
        self.store.put_student(&student).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> RosterService {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        store.ensure_schema().unwrap();
        RosterService::new(store)
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_add_student() {
        let service = service();
        let added = service.add_student(Student::new("", " Bob ", "6")).unwrap();
        assert!(!added.id.is_empty());
        assert_eq!(added.name, "Bob");

        let dup = service.add_student(Student::new(added.id.clone(), "Bob", "6"));
        assert!(matches!(dup, Err(Error::DuplicateKey(_))));

        let nameless = service.add_student(Student::new("S9", "", "6"));
        assert!(matches!(nameless, Err(Error::Validation(_))));
    }

    #[test]
    fn test_record_borrowed_unions_books() {
        let service = service();
        let alice = Student::new("S100", "Alice", "Grade 7");

        service.record_borrowed(&alice, &ids(&["b1"])).unwrap();
        let renamed = Student::new("S100", "Alice W.", "");
        let stored = service.record_borrowed(&renamed, &ids(&["b2", "b1"])).unwrap();

        assert_eq!(stored.borrowed_books.len(), 2);
        assert_eq!(stored.name, "Alice W.");
        assert_eq!(stored.grade, "Grade 7");
        assert_eq!(service.borrowers().unwrap().len(), 1);
    }

    #[test]
    fn test_record_returned() {
        let service = service();
        service
            .record_borrowed(&Student::new("S100", "Alice", "7"), &ids(&["b1", "b2"]))
            .unwrap();

        let after = service.record_returned("S100", "b1").unwrap().unwrap();
        assert_eq!(after.borrowed_books.iter().collect::<Vec<_>>(), vec!["b2"]);
        assert!(service.record_returned("S404", "b1").unwrap().is_none());
    }

    #[test]
    fn test_update_student_guards_borrowed_set() {
        let service = service();
        let stored = service
            .record_borrowed(&Student::new("S100", "Alice", "7"), &ids(&["b1"]))
            .unwrap();

        let mut edit = stored.clone();
        edit.borrowed_books.clear();
        assert!(matches!(service.update_student(&edit), Err(Error::InvalidState(_))));

        let mut edit = stored.clone();
        edit.grade = "8".to_string();
        let updated = service.update_student(&edit).unwrap();
        assert_eq!(updated.grade, "8");
        assert!(matches!(service.update_student(&edit), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_search_and_name_index() {
        let service = service();
        service.add_student(Student::new("S1", "Alice", "Grade 7")).unwrap();
        service.add_student(Student::new("S2", "Alice", "Grade 8")).unwrap();
        service.add_student(Student::new("S3", "Brian", "Grade 8")).unwrap();

        assert_eq!(service.find_by_name("Alice").unwrap().len(), 2);
        assert_eq!(service.search("grade 8").unwrap().len(), 2);
        assert_eq!(service.search("bri").unwrap().len(), 1);
        assert_eq!(service.search("").unwrap().len(), 3);
    }
}
