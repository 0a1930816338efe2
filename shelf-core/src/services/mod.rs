//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod auth;
mod dashboard;
mod doctor;
mod inventory;
mod lending;
pub mod logging;
pub mod migration;
mod roster;
mod verification;

pub use auth::{AuthService, SESSION_FILE};
pub use dashboard::{BookLine, DashboardService, DashboardSummary, Notification, NotificationLevel};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use inventory::{Availability, BookFilter, BookPatch, InventoryService};
pub use lending::{
    BorrowEntry, BorrowRequest, BorrowResult, LendingService, OutstandingLoan, ReturnReceipt,
};
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use roster::RosterService;
pub use verification::{LookupOutcome, VerificationService, VerifiedStudent};
