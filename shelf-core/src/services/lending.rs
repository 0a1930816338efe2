//! Lending service - the Available ⇄ Borrowed workflow
//!
//! A borrow of N books is N book writes, N ledger rows and one student
//! write, each committed on its own. Nothing is rolled back: the result
//! reports exactly which books went out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::roster::RosterService;
use super::verification::VerifiedStudent;
use crate::adapters::duckdb::DuckDbStore;
use crate::domain::result::{Error, ErrorKind, Result};
use crate::domain::{Book, Loan, Session, Student};
use crate::ports::{RegistryLookup, StudentRegistry};

/// What the librarian entered on the borrow form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    pub admission_number: String,
    pub student_name: String,
    pub book_ids: Vec<String>,
}

/// Batch report of a borrow
#[derive(Debug, Serialize)]
pub struct BorrowResult {
    pub admission_number: String,
    pub student_name: String,
    pub due_date: DateTime<Utc>,
    pub succeeded: i64,
    pub failed: i64,
    pub results: Vec<BorrowEntry>,
    /// The borrower's record now lists every book that went out
    pub student_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Storage failed mid-batch; later books were not attempted
    pub aborted: bool,
}

impl BorrowResult {
    pub fn borrowed_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.book_id.clone())
            .collect()
    }
}

/// Individual book result entry
#[derive(Debug, Serialize)]
pub struct BorrowEntry {
    pub book_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Serialize)]
pub struct ReturnReceipt {
    pub book_id: String,
    pub title: String,
    pub student_id: String,
    pub returned_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub was_overdue: bool,
    pub days_overdue: i64,
    pub student_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A book that is out, with whatever is known about its borrower
#[derive(Debug, Clone, Serialize)]
pub struct OutstandingLoan {
    pub book: Book,
    pub student: Option<Student>,
    pub loan: Option<Loan>,
    pub overdue: bool,
}

pub struct LendingService {
    store: Arc<DuckDbStore>,
    roster: RosterService,
    registry: Option<Arc<dyn StudentRegistry>>,
    loan_period: Duration,
}

impl LendingService {
    pub fn new(
        store: Arc<DuckDbStore>,
        registry: Option<Arc<dyn StudentRegistry>>,
        loan_period: Duration,
    ) -> Self {
        Self {
            roster: RosterService::new(Arc::clone(&store)),
            store,
            registry,
            loan_period,
        }
    }

    pub fn loan_period(&self) -> Duration {
        self.loan_period
    }

    pub fn registry_enabled(&self) -> bool {
        self.registry.is_some()
    }

    pub fn borrow(
        &self,
        session: &Session,
        request: &BorrowRequest,
        verified: Option<&VerifiedStudent>,
    ) -> Result<BorrowResult> {
        self.borrow_at(session, request, verified, Utc::now())
    }

    /// Lend `request.book_ids` to one student.
    ///
    /// With a registry configured the caller must hold a verification for
    /// the same admission number, and the registry is asked again right
    /// before anything is written. Blocks on the registry; do not call
    /// from async code.
    pub fn borrow_at(
        &self,
        session: &Session,
        request: &BorrowRequest,
        verified: Option<&VerifiedStudent>,
        now: DateTime<Utc>,
    ) -> Result<BorrowResult> {
        let admission_number = request.admission_number.trim();
        let student_name = request.student_name.trim();
        if admission_number.is_empty() {
            return Err(Error::validation("admission number is required"));
        }
        if student_name.is_empty() {
            return Err(Error::validation("student name is required"));
        }

        let mut book_ids: Vec<String> = Vec::new();
        for id in request.book_ids.iter().map(|id| id.trim()) {
            if !id.is_empty() && !book_ids.iter().any(|b| b == id) {
                book_ids.push(id.to_string());
            }
        }
        if book_ids.is_empty() {
            return Err(Error::validation("select at least one book"));
        }

        let profile = self.resolve_borrower(admission_number, student_name, verified)?;
        let due_date = now
            .checked_add_signed(self.loan_period)
            .ok_or_else(|| Error::validation("loan period puts the due date out of range"))?;

        let mut results = Vec::with_capacity(book_ids.len());
        let mut warnings = Vec::new();
        let mut aborted = false;

        for book_id in &book_ids {
            if aborted {
                results.push(BorrowEntry {
                    book_id: book_id.clone(),
                    title: None,
                    success: false,
                    error: Some("not attempted: storage became unavailable".to_string()),
                    error_kind: Some(ErrorKind::StoreUnavailable),
                });
                continue;
            }

            match self.lend_one(session, book_id, &profile.id, due_date, now) {
                Ok((book, warning)) => {
                    warnings.extend(warning);
                    results.push(BorrowEntry {
                        book_id: book_id.clone(),
                        title: Some(book.title),
                        success: true,
                        error: None,
                        error_kind: None,
                    });
                }
                Err(e) => {
                    aborted = matches!(e, Error::StoreUnavailable(_));
                    results.push(BorrowEntry {
                        book_id: book_id.clone(),
                        title: None,
                        success: false,
                        error: Some(e.to_string()),
                        error_kind: Some(e.kind()),
                    });
                }
            }
        }

        let borrowed: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.book_id.clone())
            .collect();
        let succeeded = borrowed.len() as i64;
        let failed = results.len() as i64 - succeeded;

        let mut student_updated = false;
        let mut student_error = None;
        if !borrowed.is_empty() {
            if aborted {
                warnings.push(format!(
                    "student record not updated after a storage failure; {} book(s) went out, run the doctor",
                    borrowed.len()
                ));
            } else {
                match self.roster.record_borrowed(&profile, &borrowed) {
                    Ok(_) => student_updated = true,
                    Err(e) => {
                        warnings.push(
                            "books are marked as borrowed but the student record was not updated"
                                .to_string(),
                        );
                        student_error = Some(e.to_string());
                    }
                }
            }
        }

        Ok(BorrowResult {
            admission_number: profile.id,
            student_name: profile.name,
            due_date,
            succeeded,
            failed,
            results,
            student_updated,
            student_error,
            warnings,
            aborted,
        })
    }

    /// Who the books go to. The registry's name and grade win over what
    /// was typed.
    fn resolve_borrower(
        &self,
        admission_number: &str,
        student_name: &str,
        verified: Option<&VerifiedStudent>,
    ) -> Result<Student> {
        let Some(registry) = &self.registry else {
            let grade = self
                .store
                .get_student(admission_number)?
                .map(|s| s.grade)
                .unwrap_or_default();
            return Ok(Student::new(admission_number, student_name, grade));
        };

        match verified {
            Some(v) if v.admission_number() == admission_number => {}
            _ => {
                return Err(Error::Verification(
                    "verify the admission number before borrowing".to_string(),
                ))
            }
        }

        match registry.verify_student(admission_number)? {
            RegistryLookup::Found(record) => Ok(Student::from_registry(&record)),
            RegistryLookup::NotFound => Err(Error::Verification(
                "the school registry has no student with this admission number".to_string(),
            )),
        }
    }

    /// Available -> Borrowed for one book, plus its ledger row.
    /// A ledger failure after the book is committed becomes a warning.
    fn lend_one(
        &self,
        session: &Session,
        book_id: &str,
        student_id: &str,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(Book, Option<String>)> {
        let mut book = self
            .store
            .get_book(book_id)?
            .ok_or_else(|| Error::not_found(format!("book {}", book_id)))?;
        book.mark_borrowed(student_id, due_date)?;
        let stored = self.store.put_book(&book)?;

        let loan = Loan::open(book_id, student_id, now, due_date, session.username());
        let warning = self
            .store
            .add_loan(&loan)
            .err()
            .map(|e| format!("'{}' is out but its loan was not recorded: {}", stored.title, e));

        Ok((stored, warning))
    }

    pub fn return_book(&self, session: &Session, book_id: &str) -> Result<ReturnReceipt> {
        self.return_book_at(session, book_id, Utc::now())
    }

    /// Borrowed -> Available. A book that is not out is left untouched.
    pub fn return_book_at(
        &self,
        session: &Session,
        book_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReturnReceipt> {
        let book_id = book_id.trim();
        let mut book = self
            .store
            .get_book(book_id)?
            .ok_or_else(|| Error::not_found(format!("book {}", book_id)))?;

        let due_date = book.due_date;
        let student_id = book.mark_returned(now)?;
        let stored = self.store.put_book(&book)?;

        let mut warnings = Vec::new();
        match self.store.close_loan(book_id, now, session.username()) {
            Ok(Some(_)) => {}
            Ok(None) => warnings.push(format!("no open loan was recorded for '{}'", stored.title)),
            Err(e) => warnings.push(format!("loan for '{}' was not closed: {}", stored.title, e)),
        }

        let mut student_updated = false;
        let mut student_error = None;
        match self.roster.record_returned(&student_id, book_id) {
            Ok(Some(_)) => student_updated = true,
            Ok(None) => warnings.push(format!(
                "borrower {} has no student record; only the book was updated",
                student_id
            )),
            Err(e) => student_error = Some(e.to_string()),
        }

        let days_overdue = due_date
            .map(|due| (now - due).num_days())
            .filter(|days| *days > 0)
            .unwrap_or(0);

        Ok(ReturnReceipt {
            book_id: stored.id,
            title: stored.title,
            student_id,
            returned_at: now,
            due_date,
            was_overdue: due_date.map(|due| due < now).unwrap_or(false),
            days_overdue,
            student_updated,
            student_error,
            warnings,
        })
    }

    /// Every borrowed book with its borrower and open loan, soonest due first
    pub fn outstanding_at(&self, now: DateTime<Utc>) -> Result<Vec<OutstandingLoan>> {
        let students: HashMap<String, Student> = self
            .store
            .get_students()?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let mut open_loans: HashMap<String, Loan> = HashMap::new();
        for loan in self.store.get_open_loans()? {
            // Newest first, keep the first seen per book
            open_loans.entry(loan.book_id.clone()).or_insert(loan);
        }

        let mut outstanding: Vec<OutstandingLoan> = self
            .store
            .get_books()?
            .into_iter()
            .filter(Book::is_borrowed)
            .map(|book| OutstandingLoan {
                student: book
                    .borrowed_by
                    .as_ref()
                    .and_then(|id| students.get(id).cloned()),
                loan: open_loans.remove(&book.id),
                overdue: book.is_overdue(now),
                book,
            })
            .collect();
        outstanding.sort_by_key(|o| o.book.due_date);
        Ok(outstanding)
    }

    pub fn outstanding(&self) -> Result<Vec<OutstandingLoan>> {
        self.outstanding_at(Utc::now())
    }

    pub fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<OutstandingLoan>> {
        Ok(self
            .outstanding_at(now)?
            .into_iter()
            .filter(|o| o.overdue)
            .collect())
    }

    pub fn borrowers(&self) -> Result<Vec<Student>> {
        self.roster.borrowers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdminProfile, Role};
    use crate::ports::{EnrollmentStatus, RegistryStudent};

    fn session() -> Session {
        Session::new(
            AdminProfile {
                id: "a1".to_string(),
                username: "admin".to_string(),
                name: "System Administrator".to_string(),
                role: Role::Admin,
            },
            Utc::now(),
        )
    }

    struct FixedRegistry(Vec<RegistryStudent>);

    impl StudentRegistry for FixedRegistry {
        fn name(&self) -> &str {
            "fixed"
        }

        fn verify_student(&self, admission_number: &str) -> Result<RegistryLookup> {
            Ok(self
                .0
                .iter()
                .find(|s| s.admission_number == admission_number)
                .cloned()
                .map(RegistryLookup::Found)
                .unwrap_or(RegistryLookup::NotFound))
        }
    }

    fn alice_record() -> RegistryStudent {
        RegistryStudent {
            admission_number: "S100".to_string(),
            name: "Alice Mwangi".to_string(),
            grade: "Grade 7".to_string(),
            status: EnrollmentStatus::Active,
        }
    }

    fn setup(registry: Option<Arc<dyn StudentRegistry>>) -> (Arc<DuckDbStore>, LendingService) {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        store.ensure_schema().unwrap();
        let lending = LendingService::new(Arc::clone(&store), registry, Duration::days(14));
        (store, lending)
    }

    fn add_book(store: &DuckDbStore, id: &str, isbn: &str) {
        let mut book = Book::new(format!("Book {}", id), "Author", isbn);
        book.id = id.to_string();
        store.add_book(&book).unwrap();
    }

    fn request(adm: &str, name: &str, ids: &[&str]) -> BorrowRequest {
        BorrowRequest {
            admission_number: adm.to_string(),
            student_name: name.to_string(),
            book_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_borrow_without_registry() {
        let (store, lending) = setup(None);
        add_book(&store, "b1", "111");
        let now = Utc::now();

        let result = lending
            .borrow_at(&session(), &request("S100", "Alice", &["b1", "b1"]), None, now)
            .unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.results.len(), 1);
        assert!(result.student_updated);
        assert_eq!(result.due_date, now + Duration::days(14));

        let book = store.get_book("b1").unwrap().unwrap();
        assert!(!book.available);
        assert_eq!(book.borrowed_by.as_deref(), Some("S100"));
        assert_eq!(store.get_open_loans().unwrap()[0].issued_by, "admin");
    }

    #[test]
    fn test_borrow_validation() {
        let (_, lending) = setup(None);
        let err = lending
            .borrow(&session(), &request(" ", "Alice", &["b1"]), None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = lending
            .borrow(&session(), &request("S100", "Alice", &[]), None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_registry_requires_matching_verification() {
        let registry: Arc<dyn StudentRegistry> = Arc::new(FixedRegistry(vec![alice_record()]));
        let (store, lending) = setup(Some(registry));
        add_book(&store, "b1", "111");

        let err = lending
            .borrow(&session(), &request("S100", "Alice", &["b1"]), None)
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));

        let verified = VerifiedStudent {
            record: alice_record(),
            verified_at: Utc::now(),
        };
        let result = lending
            .borrow(&session(), &request("S100", "alice typed", &["b1"]), Some(&verified))
            .unwrap();
        assert_eq!(result.student_name, "Alice Mwangi");

        let student = store.get_student("S100").unwrap().unwrap();
        assert_eq!(student.name, "Alice Mwangi");
        assert_eq!(student.grade, "Grade 7");
    }

    #[test]
    fn test_registry_not_found_writes_nothing() {
        let registry: Arc<dyn StudentRegistry> = Arc::new(FixedRegistry(vec![]));
        let (store, lending) = setup(Some(registry));
        add_book(&store, "b1", "111");

        // Verified earlier, gone from the registry by commit time
        let stale = VerifiedStudent {
            record: alice_record(),
            verified_at: Utc::now(),
        };
        let err = lending
            .borrow(&session(), &request("S100", "Alice", &["b1"]), Some(&stale))
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
        assert!(store.get_book("b1").unwrap().unwrap().available);
        assert!(store.get_student("S100").unwrap().is_none());
    }

    #[test]
    fn test_partial_batch() {
        let (store, lending) = setup(None);
        add_book(&store, "b1", "111");
        add_book(&store, "b2", "222");
        lending
            .borrow(&session(), &request("S200", "Brian", &["b2"]), None)
            .unwrap();

        let result = lending
            .borrow(&session(), &request("S100", "Alice", &["b1", "b2", "missing"]), None)
            .unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 2);
        assert_eq!(result.results[1].error_kind, Some(ErrorKind::InvalidState));
        assert_eq!(result.results[2].error_kind, Some(ErrorKind::NotFound));
        assert!(!result.aborted);

        let alice = store.get_student("S100").unwrap().unwrap();
        assert_eq!(alice.borrowed_books.iter().collect::<Vec<_>>(), vec!["b1"]);
        assert_eq!(
            store.get_book("b2").unwrap().unwrap().borrowed_by.as_deref(),
            Some("S200")
        );
    }

    #[test]
    fn test_storage_failure_mid_batch_aborts() {
        let (store, lending) = setup(None);
        add_book(&store, "b1", "111");
        add_book(&store, "b2", "222");
        add_book(&store, "b3", "333");

        // b1's write goes through, b2's fails
        store.fail_write_step(2);
        let result = lending
            .borrow(&session(), &request("S100", "Alice", &["b1", "b2", "b3"]), None)
            .unwrap();

        assert!(result.aborted);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 2);
        assert!(result.results[0].success);
        assert_eq!(result.results[1].error_kind, Some(ErrorKind::StoreUnavailable));
        assert_eq!(result.results[2].error_kind, Some(ErrorKind::StoreUnavailable));
        assert!(result.results[2]
            .error
            .as_deref()
            .unwrap()
            .contains("not attempted"));
        assert!(!result.student_updated);
        assert!(result.student_error.is_none());
        assert!(result.warnings.iter().any(|w| w.contains("student record not updated")));

        // No rollback: b1 stays out with its loan row, nothing else moved
        let b1 = store.get_book("b1").unwrap().unwrap();
        assert_eq!(b1.borrowed_by.as_deref(), Some("S100"));
        assert_eq!(store.get_loans_for_book("b1").unwrap().len(), 1);
        assert!(store.get_book("b2").unwrap().unwrap().available);
        assert!(store.get_book("b3").unwrap().unwrap().available);
        assert!(store.get_loans_for_book("b3").unwrap().is_empty());
        assert!(store.get_student("S100").unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_loan_period_is_rejected() {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        store.ensure_schema().unwrap();
        add_book(&store, "b1", "111");
        let lending = LendingService::new(Arc::clone(&store), None, Duration::days(1_000_000_000));

        let err = lending
            .borrow(&session(), &request("S100", "Alice", &["b1"]), None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {:?}", err);
        assert!(store.get_book("b1").unwrap().unwrap().available);
        assert!(store.get_student("S100").unwrap().is_none());
    }

    #[test]
    fn test_all_failed_creates_no_student() {
        let (store, lending) = setup(None);
        let result = lending
            .borrow(&session(), &request("S100", "Alice", &["nope"]), None)
            .unwrap();
        assert_eq!(result.succeeded, 0);
        assert!(!result.student_updated);
        assert!(store.get_student("S100").unwrap().is_none());
    }

    #[test]
    fn test_return_flow_and_overdue() {
        let (store, lending) = setup(None);
        add_book(&store, "b1", "111");
        let borrowed_at = Utc::now() - Duration::days(20);
        lending
            .borrow_at(&session(), &request("S100", "Alice", &["b1"]), None, borrowed_at)
            .unwrap();

        let now = Utc::now();
        assert_eq!(lending.overdue(now).unwrap().len(), 1);

        let receipt = lending.return_book_at(&session(), "b1", now).unwrap();
        assert_eq!(receipt.student_id, "S100");
        assert!(receipt.was_overdue);
        assert_eq!(receipt.days_overdue, 6);
        assert!(receipt.student_updated);
        assert!(receipt.warnings.is_empty());

        let book = store.get_book("b1").unwrap().unwrap();
        assert!(book.available);
        assert_eq!(book.return_date.map(|d| d.timestamp()), Some(now.timestamp()));
        assert!(store.get_student("S100").unwrap().unwrap().borrowed_books.is_empty());
        assert!(store.get_open_loans().unwrap().is_empty());
        assert!(lending.borrowers().unwrap().is_empty());
    }

    #[test]
    fn test_return_of_available_book_is_invalid() {
        let (store, lending) = setup(None);
        add_book(&store, "b1", "111");
        let before = store.get_book("b1").unwrap().unwrap();

        let err = lending.return_book(&session(), "b1").unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(store.get_book("b1").unwrap().unwrap(), before);

        let err = lending.return_book(&session(), "missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_return_with_missing_student_warns() {
        let (store, lending) = setup(None);
        let mut book = Book::new("Orphan", "Author", "111");
        book.id = "b1".to_string();
        book.mark_borrowed("S404", Utc::now()).unwrap();
        store.add_book(&book).unwrap();

        let receipt = lending.return_book(&session(), "b1").unwrap();
        assert!(!receipt.student_updated);
        assert_eq!(receipt.warnings.len(), 2);
        assert!(store.get_book("b1").unwrap().unwrap().available);
    }

    #[test]
    fn test_outstanding_joins_student_and_loan() {
        let (store, lending) = setup(None);
        add_book(&store, "b1", "111");
        add_book(&store, "b2", "222");
        lending
            .borrow(&session(), &request("S100", "Alice", &["b1"]), None)
            .unwrap();

        let outstanding = lending.outstanding().unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].book.id, "b1");
        assert_eq!(outstanding[0].student.as_ref().unwrap().name, "Alice");
        assert!(outstanding[0].loan.is_some());
        assert!(!outstanding[0].overdue);
    }
}
