//! Shelf Core - Lending and inventory logic for a school library
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core library entities (Book, Student, Admin, Loan, Session)
//! - **ports**: Trait definitions for external dependencies (StudentRegistry)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB store, school registry HTTP client)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod log_migrations;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use adapters::duckdb::DuckDbStore;
use adapters::school_registry::SchoolRegistryClient;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::{Admin, AdminProfile, AuthState, Book, Loan, Role, Session, Student};
pub use domain::result::{Error, ErrorKind, Result};
pub use ports::{RegistryLookup, RegistryStudent, StudentRegistry};
pub use services::{EntryPoint, LogEvent, LoggingService};

/// Library database file inside the shelf directory
pub const DB_FILE: &str = "library.duckdb";

/// Main context for Shelf operations
///
/// This is the primary entry point for all business logic. It holds
/// the store, configuration, and all services.
pub struct ShelfContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub inventory: InventoryService,
    pub roster: RosterService,
    pub lending: LendingService,
    pub verification: VerificationService,
    pub auth: AuthService,
    pub dashboard: DashboardService,
    pub doctor: DoctorService,
}

impl ShelfContext {
    /// Create a context from the settings found in `shelf_dir`.
    ///
    /// Builds a blocking HTTP client when the registry is enabled, so call
    /// this outside any async runtime.
    pub fn new(shelf_dir: &Path) -> Result<Self> {
        let config = Config::load(shelf_dir)?;
        Self::with_config(shelf_dir, config)
    }

    pub fn with_config(shelf_dir: &Path, config: Config) -> Result<Self> {
        let registry: Option<Arc<dyn StudentRegistry>> = if config.registry.enabled {
            Some(Arc::new(SchoolRegistryClient::new(&config.registry)?))
        } else {
            None
        };
        Self::with_registry(shelf_dir, config, registry)
    }

    /// Create a context around an explicit registry (or none)
    pub fn with_registry(
        shelf_dir: &Path,
        config: Config,
        registry: Option<Arc<dyn StudentRegistry>>,
    ) -> Result<Self> {
        fs::create_dir_all(shelf_dir)?;

        let store = Arc::new(DuckDbStore::new(&shelf_dir.join(DB_FILE))?);
        store.ensure_schema()?;

        let inventory = InventoryService::new(Arc::clone(&store));
        let roster = RosterService::new(Arc::clone(&store));
        let lending = LendingService::new(
            Arc::clone(&store),
            registry.clone(),
            config.lending.loan_period(),
        );
        let verification = VerificationService::new(registry);
        let auth = AuthService::new(Arc::clone(&store), shelf_dir);
        let dashboard = DashboardService::new(Arc::clone(&store));
        let doctor = DoctorService::new(Arc::clone(&store));

        Ok(Self {
            config,
            store,
            inventory,
            roster,
            lending,
            verification,
            auth,
            dashboard,
            doctor,
        })
    }
}
