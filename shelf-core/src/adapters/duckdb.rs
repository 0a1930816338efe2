//! DuckDB store implementation

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection};

use crate::domain::result::{Error, Result};
use crate::domain::{Admin, Book, Loan, Role, Student};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const BOOK_COLUMNS: &str = "book_id, title, author, isbn, category, published_year, copies,
     description, cover_image, available, borrowed_by, due_date, return_date,
     version, created_at, updated_at";

const STUDENT_COLUMNS: &str =
    "student_id, name, grade, borrowed_books, version, created_at, updated_at";

const ADMIN_COLUMNS: &str = "admin_id, username, password, name, role, version";

const LOAN_COLUMNS: &str =
    "loan_id, book_id, student_id, borrowed_at, due_date, returned_at, issued_by, received_by";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock")
}

/// The library's persistent store: books, students, admins and the loan ledger.
///
/// One connection behind a mutex. Every call blocks until the engine is done.
/// A `put_*` that touches an indexed column runs its statements in one
/// transaction.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    #[cfg(test)]
    fail_at: AtomicUsize,
}

impl DuckDbStore {
    /// Open (or create) the database file.
    ///
    /// Retries with exponential backoff when another process holds the file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        #[cfg(test)]
                        fail_at: AtomicUsize::new(0),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[shelf] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(Error::store(err_msg));
                }
            }
        }

        Err(Error::store(match last_error {
            Some(e) => e.to_string(),
            None => format!("failed to open database after {} retries", MAX_RETRIES),
        }))
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
            #[cfg(test)]
            fail_at: AtomicUsize::new(0),
        })
    }

    /// Make the `n`-th versioned write statement from now fail as if the
    /// engine had gone away. `0` disarms.
    #[cfg(test)]
    pub(crate) fn fail_write_step(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    /// Run raw SQL against the connection
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(sql, [])?)
    }

    /// Called before every statement of a versioned write
    fn write_step(&self) -> Result<()> {
        #[cfg(test)]
        {
            let left = self.fail_at.load(Ordering::SeqCst);
            if left > 0 {
                self.fail_at.store(left - 1, Ordering::SeqCst);
                if left == 1 {
                    return Err(Error::store("write failed: connection lost"));
                }
            }
        }
        Ok(())
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading off: JSON is linked statically, ICU is not used
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::store("database connection lock poisoned"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run migration steps up to `schema_version`
    pub fn initialize(&self, schema_version: u32) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_to(schema_version)
    }

    /// Bring the schema to the newest version this build knows
    pub fn ensure_schema(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.lock()?;
        MigrationService::new(&conn).current_version()
    }

    pub fn pending_migrations(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        MigrationService::new(&conn).get_pending()
    }

    /// Check if a table exists in the main schema
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = 'main' AND table_name = ?",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // === Book operations ===

    /// Insert a new book. Identity or ISBN collisions are `DuplicateKey`.
    pub fn add_book(&self, book: &Book) -> Result<()> {
        let conn = self.lock()?;
        Self::insert_book(&conn, book)
    }

    fn insert_book(conn: &Connection, book: &Book) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO sys_books ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                BOOK_COLUMNS
            ),
            params![
                book.id,
                book.title,
                book.author,
                book.isbn,
                book.category,
                book.published_year,
                book.copies,
                book.description,
                book.cover_image,
                book.available,
                book.borrowed_by,
                book.due_date.map(|d| d.to_rfc3339()),
                book.return_date.map(|d| d.to_rfc3339()),
                book.version.max(1),
                book.created_at.to_rfc3339(),
                book.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_books(&self) -> Result<Vec<Book>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_books ORDER BY title, book_id",
            BOOK_COLUMNS
        ))?;
        let books = stmt
            .query_map([], row_to_book)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(books)
    }

    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.lock()?;
        Self::select_book(&conn, "book_id", id)
    }

    /// Unique-index lookup; `isbn` must already be normalized
    pub fn get_book_by_isbn(&self, isbn: &str) -> Result<Option<Book>> {
        let conn = self.lock()?;
        Self::select_book(&conn, "isbn", isbn)
    }

    fn select_book(conn: &Connection, column: &str, key: &str) -> Result<Option<Book>> {
        query_one(
            conn,
            &format!("SELECT {} FROM sys_books WHERE {} = ?", BOOK_COLUMNS, column),
            key,
            row_to_book,
        )
    }

    /// Upsert a book by identity.
    ///
    /// An existing row is only replaced when `book.version` matches the stored
    /// version; the stored record (with its bumped version) is returned.
    pub fn put_book(&self, book: &Book) -> Result<Book> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let current: Option<(i64, String)> = query_one(
            &tx,
            "SELECT version, isbn FROM sys_books WHERE book_id = ?",
            &book.id,
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let Some((stored_version, stored_isbn)) = current else {
            let mut stored = book.clone();
            stored.version = book.version.max(1);
            self.write_step()?;
            Self::insert_book(&tx, &stored)?;
            tx.commit()?;
            return Ok(stored);
        };

        if stored_version != book.version {
            return Err(stale_version("book", &book.id, book.version, stored_version));
        }

        // Indexed column goes in its own statement, only when it changed
        if stored_isbn != book.isbn {
            self.write_step()?;
            tx.execute(
                "UPDATE sys_books SET isbn = ? WHERE book_id = ? AND version = ?",
                params![book.isbn, book.id, book.version],
            )?;
        }

        self.write_step()?;
        let changed = tx.execute(
            "UPDATE sys_books SET
                title = ?, author = ?, category = ?, published_year = ?, copies = ?,
                description = ?, cover_image = ?, available = ?, borrowed_by = ?,
                due_date = ?, return_date = ?, updated_at = ?, version = version + 1
             WHERE book_id = ? AND version = ?",
            params![
                book.title,
                book.author,
                book.category,
                book.published_year,
                book.copies,
                book.description,
                book.cover_image,
                book.available,
                book.borrowed_by,
                book.due_date.map(|d| d.to_rfc3339()),
                book.return_date.map(|d| d.to_rfc3339()),
                now.to_rfc3339(),
                book.id,
                book.version,
            ],
        )?;
        if changed == 0 {
            return Err(Error::Conflict(format!("book {} changed during write", book.id)));
        }
        tx.commit()?;

        let mut stored = book.clone();
        stored.version = book.version + 1;
        stored.updated_at = now;
        Ok(stored)
    }

    pub fn count_books(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_books", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Student operations ===

    pub fn add_student(&self, student: &Student) -> Result<()> {
        let conn = self.lock()?;
        Self::insert_student(&conn, student)
    }

    fn insert_student(conn: &Connection, student: &Student) -> Result<()> {
        let borrowed = serde_json::to_string(&student.borrowed_books)?;
        conn.execute(
            &format!(
                "INSERT INTO sys_students ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                STUDENT_COLUMNS
            ),
            params![
                student.id,
                student.name,
                student.grade,
                borrowed,
                student.version.max(1),
                student.created_at.to_rfc3339(),
                student.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_students(&self) -> Result<Vec<Student>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_students ORDER BY name, student_id",
            STUDENT_COLUMNS
        ))?;
        let students = stmt
            .query_map([], row_to_student)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(students)
    }

    pub fn get_student(&self, id: &str) -> Result<Option<Student>> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM sys_students WHERE student_id = ?", STUDENT_COLUMNS),
            id,
            row_to_student,
        )
    }

    /// Non-unique name index lookup
    pub fn get_students_by_name(&self, name: &str) -> Result<Vec<Student>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_students WHERE name = ? ORDER BY student_id",
            STUDENT_COLUMNS
        ))?;
        let students = stmt
            .query_map([name], row_to_student)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(students)
    }

    /// Version-guarded upsert, same contract as [`DuckDbStore::put_book`]
    pub fn put_student(&self, student: &Student) -> Result<Student> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let current: Option<(i64, String)> = query_one(
            &tx,
            "SELECT version, name FROM sys_students WHERE student_id = ?",
            &student.id,
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let Some((stored_version, stored_name)) = current else {
            let mut stored = student.clone();
            stored.version = student.version.max(1);
            self.write_step()?;
            Self::insert_student(&tx, &stored)?;
            tx.commit()?;
            return Ok(stored);
        };

        if stored_version != student.version {
            return Err(stale_version("student", &student.id, student.version, stored_version));
        }

        if stored_name != student.name {
            self.write_step()?;
            tx.execute(
                "UPDATE sys_students SET name = ? WHERE student_id = ? AND version = ?",
                params![student.name, student.id, student.version],
            )?;
        }

        let borrowed = serde_json::to_string(&student.borrowed_books)?;
        self.write_step()?;
        let changed = tx.execute(
            "UPDATE sys_students SET
                grade = ?, borrowed_books = ?, updated_at = ?, version = version + 1
             WHERE student_id = ? AND version = ?",
            params![
                student.grade,
                borrowed,
                now.to_rfc3339(),
                student.id,
                student.version
            ],
        )?;
        if changed == 0 {
            return Err(Error::Conflict(format!(
                "student {} changed during write",
                student.id
            )));
        }
        tx.commit()?;

        let mut stored = student.clone();
        stored.version = student.version + 1;
        stored.updated_at = now;
        Ok(stored)
    }

    pub fn count_students(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_students", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Admin operations ===

    pub fn add_admin(&self, admin: &Admin) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO sys_admins ({}) VALUES (?, ?, ?, ?, ?, ?)", ADMIN_COLUMNS),
            params![
                admin.id,
                admin.username,
                admin.password,
                admin.name,
                admin.role.as_str(),
                admin.version.max(1),
            ],
        )?;
        Ok(())
    }

    pub fn get_admins(&self) -> Result<Vec<Admin>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_admins ORDER BY username",
            ADMIN_COLUMNS
        ))?;
        let admins = stmt
            .query_map([], row_to_admin)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(admins)
    }

    pub fn get_admin(&self, id: &str) -> Result<Option<Admin>> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM sys_admins WHERE admin_id = ?", ADMIN_COLUMNS),
            id,
            row_to_admin,
        )
    }

    pub fn get_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let conn = self.lock()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM sys_admins WHERE username = ?", ADMIN_COLUMNS),
            username,
            row_to_admin,
        )
    }

    /// Version-guarded update of an existing admin
    pub fn put_admin(&self, admin: &Admin) -> Result<Admin> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current: Option<(i64, String)> = query_one(
            &tx,
            "SELECT version, username FROM sys_admins WHERE admin_id = ?",
            &admin.id,
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let Some((stored_version, stored_username)) = current else {
            return Err(Error::not_found(format!("admin {}", admin.id)));
        };
        if stored_version != admin.version {
            return Err(stale_version("admin", &admin.id, admin.version, stored_version));
        }

        if stored_username != admin.username {
            self.write_step()?;
            tx.execute(
                "UPDATE sys_admins SET username = ? WHERE admin_id = ? AND version = ?",
                params![admin.username, admin.id, admin.version],
            )?;
        }

        self.write_step()?;
        let changed = tx.execute(
            "UPDATE sys_admins SET password = ?, name = ?, role = ?, version = version + 1
             WHERE admin_id = ? AND version = ?",
            params![
                admin.password,
                admin.name,
                admin.role.as_str(),
                admin.id,
                admin.version
            ],
        )?;
        if changed == 0 {
            return Err(Error::Conflict(format!("admin {} changed during write", admin.id)));
        }
        tx.commit()?;

        let mut stored = admin.clone();
        stored.version = admin.version + 1;
        Ok(stored)
    }

    // === Loan ledger ===

    pub fn add_loan(&self, loan: &Loan) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO sys_loans ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)", LOAN_COLUMNS),
            params![
                loan.id,
                loan.book_id,
                loan.student_id,
                loan.borrowed_at.to_rfc3339(),
                loan.due_date.to_rfc3339(),
                loan.returned_at.map(|d| d.to_rfc3339()),
                loan.issued_by,
                loan.received_by,
            ],
        )?;
        Ok(())
    }

    /// Close the most recent open loan of a book. `None` when no loan is open.
    pub fn close_loan(
        &self,
        book_id: &str,
        returned_at: DateTime<Utc>,
        received_by: &str,
    ) -> Result<Option<Loan>> {
        let conn = self.lock()?;
        let open = query_one(
            &conn,
            &format!(
                "SELECT {} FROM sys_loans WHERE book_id = ? AND returned_at IS NULL
                 ORDER BY borrowed_at DESC LIMIT 1",
                LOAN_COLUMNS
            ),
            book_id,
            row_to_loan,
        )?;

        let Some(mut loan) = open else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE sys_loans SET returned_at = ?, received_by = ? WHERE loan_id = ?",
            params![returned_at.to_rfc3339(), received_by, loan.id],
        )?;
        loan.returned_at = Some(returned_at);
        loan.received_by = Some(received_by.to_string());
        Ok(Some(loan))
    }

    pub fn get_loans(&self) -> Result<Vec<Loan>> {
        self.query_loans("", None)
    }

    pub fn get_open_loans(&self) -> Result<Vec<Loan>> {
        self.query_loans("WHERE returned_at IS NULL", None)
    }

    pub fn get_loans_for_book(&self, book_id: &str) -> Result<Vec<Loan>> {
        self.query_loans("WHERE book_id = ?", Some(book_id))
    }

    fn query_loans(&self, filter: &str, key: Option<&str>) -> Result<Vec<Loan>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_loans {} ORDER BY borrowed_at DESC",
            LOAN_COLUMNS, filter
        ))?;
        let loans = match key {
            Some(key) => stmt.query_map([key], row_to_loan)?.collect::<duckdb::Result<Vec<_>>>()?,
            None => stmt.query_map([], row_to_loan)?.collect::<duckdb::Result<Vec<_>>>()?,
        };
        Ok(loans)
    }
}

/// First row of a single-key query, if any
fn query_one<T, F>(conn: &Connection, sql: &str, key: &str, f: F) -> Result<Option<T>>
where
    F: FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map([key], f)?;
    let first = rows.next().transpose()?;
    Ok(first)
}

fn stale_version(what: &str, id: &str, given: i64, stored: i64) -> Error {
    Error::Conflict(format!(
        "{} {} is at version {}, write was based on version {}",
        what, id, stored, given
    ))
}

// Row mapping

fn row_to_book(row: &duckdb::Row) -> duckdb::Result<Book> {
    // Column order follows BOOK_COLUMNS
    let due_date: Option<String> = row.get(11)?;
    let return_date: Option<String> = row.get(12)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        isbn: row.get(3)?,
        category: row.get(4)?,
        published_year: row.get(5)?,
        copies: row.get(6)?,
        description: row.get(7)?,
        cover_image: row.get(8)?,
        available: row.get(9)?,
        borrowed_by: row.get(10)?,
        due_date: due_date.as_deref().map(|s| parse_timestamp(11, s)).transpose()?,
        return_date: return_date.as_deref().map(|s| parse_timestamp(12, s)).transpose()?,
        version: row.get(13)?,
        created_at: parse_timestamp(14, &created_at)?,
        updated_at: parse_timestamp(15, &updated_at)?,
    })
}

fn row_to_student(row: &duckdb::Row) -> duckdb::Result<Student> {
    let borrowed_json: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        grade: row.get(2)?,
        borrowed_books: parse_id_set(3, &borrowed_json)?,
        version: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
        updated_at: parse_timestamp(6, &updated_at)?,
    })
}

fn row_to_admin(row: &duckdb::Row) -> duckdb::Result<Admin> {
    let role: String = row.get(4)?;
    Ok(Admin {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        name: row.get(3)?,
        role: role
            .parse::<Role>()
            .map_err(|e| conversion_failure(4, e))?,
        version: row.get(5)?,
    })
}

fn row_to_loan(row: &duckdb::Row) -> duckdb::Result<Loan> {
    let borrowed_at: String = row.get(3)?;
    let due_date: String = row.get(4)?;
    let returned_at: Option<String> = row.get(5)?;

    Ok(Loan {
        id: row.get(0)?,
        book_id: row.get(1)?,
        student_id: row.get(2)?,
        borrowed_at: parse_timestamp(3, &borrowed_at)?,
        due_date: parse_timestamp(4, &due_date)?,
        returned_at: returned_at.as_deref().map(|s| parse_timestamp(5, s)).transpose()?,
        issued_by: row.get(6)?,
        received_by: row.get(7)?,
    })
}

// Helper functions

/// A text column that does not decode fails the whole read
fn conversion_failure<E>(column: usize, err: E) -> duckdb::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    duckdb::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_timestamp(column: usize, s: &str) -> duckdb::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(column, e))
}

/// Parse the JSON id array stored in `sys_students.borrowed_books`
fn parse_id_set(column: usize, s: &str) -> duckdb::Result<BTreeSet<String>> {
    serde_json::from_str(s).map_err(|e| conversion_failure(column, e))
}
