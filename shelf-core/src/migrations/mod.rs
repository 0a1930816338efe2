//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary at build time using include_str!.
//! Each migration is a tuple of (name, sql_content). The leading number of
//! the file name is the schema version the step brings the store to.
//! Migrations are sorted by name and applied in order.

/// All migrations, embedded at compile time.
/// Format: (filename, sql_content)
///
/// IMPORTANT: When adding a new migration:
/// 1. Create the SQL file: NNN_description.sql
/// 2. Add an entry here in order
/// 3. Bump SCHEMA_VERSION
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_books_students.sql", include_str!("001_books_students.sql")),
    ("002_admins.sql", include_str!("002_admins.sql")),
    ("003_loans.sql", include_str!("003_loans.sql")),
];

/// Newest schema version this build knows how to create
pub const SCHEMA_VERSION: u32 = 3;

/// Name of the bootstrap step that creates the migration ledger
pub const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";

/// Schema version a migration file brings the store to ("002_admins.sql" -> 2)
pub fn migration_version(name: &str) -> Option<u32> {
    name.split('_').next().and_then(|prefix| prefix.parse().ok())
}
