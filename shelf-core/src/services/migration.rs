//! Migration service - manages database schema migrations
//!
//! Migrations are SQL files embedded at compile time. Each migration is
//! tracked in the sys_migrations table so it is applied exactly once.

use duckdb::Connection;

use crate::domain::result::{Error, Result};
use crate::migrations::{migration_version, BOOTSTRAP_MIGRATION, MIGRATIONS, SCHEMA_VERSION};

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
    /// Schema version after the run
    pub schema_version: u32,
}

/// Service for managing database migrations
pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    /// Create a new migration service with a database connection
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Bring the schema to the newest known version
    pub fn run_pending(&self) -> Result<MigrationResult> {
        self.run_to(SCHEMA_VERSION)
    }

    /// Apply every unapplied migration up to and including `target`.
    ///
    /// A store already past `target` is left alone.
    pub fn run_to(&self, target: u32) -> Result<MigrationResult> {
        if target > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "schema version {} requested but this build only knows up to {}",
                target, SCHEMA_VERSION
            )));
        }

        let mut newly_applied = Vec::new();

        // Bootstrap the ledger table on a fresh database
        let bootstrap_ran = if !self.migrations_table_exists()? {
            if let Some((name, sql)) = MIGRATIONS.iter().find(|(n, _)| *n == BOOTSTRAP_MIGRATION) {
                self.conn.execute_batch(sql)?;
                self.record_migration(name)?;
                newly_applied.push(name.to_string());
                true
            } else {
                false
            }
        } else {
            false
        };

        let applied_set = self.get_applied()?;
        let already_applied = if bootstrap_ran {
            applied_set.len().saturating_sub(1)
        } else {
            applied_set.len()
        };

        for (name, sql) in MIGRATIONS.iter() {
            if *name == BOOTSTRAP_MIGRATION {
                continue;
            }
            let version = migration_version(name).unwrap_or(u32::MAX);
            if version > target {
                break;
            }
            if !applied_set.iter().any(|applied| applied == name) {
                self.conn.execute_batch(sql)?;
                self.record_migration(name)?;
                newly_applied.push(name.to_string());
            }
        }

        Ok(MigrationResult {
            applied: newly_applied,
            already_applied,
            schema_version: self.current_version()?,
        })
    }

    /// Highest version among applied migrations (0 on a fresh database)
    pub fn current_version(&self) -> Result<u32> {
        if !self.migrations_table_exists()? {
            return Ok(0);
        }
        Ok(self
            .get_applied()?
            .iter()
            .filter_map(|name| migration_version(name))
            .max()
            .unwrap_or(0))
    }

    /// Check if sys_migrations table exists
    fn migrations_table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get list of already applied migration names
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for name in names {
            result.push(name?);
        }
        Ok(result)
    }

    /// Get list of pending migration names
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let applied = if self.migrations_table_exists()? {
            self.get_applied()?
        } else {
            Vec::new()
        };
        let pending: Vec<String> = MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.iter().any(|a| a == name))
            .map(|(name, _)| name.to_string())
            .collect();
        Ok(pending)
    }

    /// Record a migration as applied
    fn record_migration(&self, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sys_migrations (migration_name) VALUES (?)",
            [name],
        )?;
        Ok(())
    }
}
