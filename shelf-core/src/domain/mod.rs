//! Core domain entities
//!
//! All library entities are defined here. These are pure data structures
//! with validation and state transition logic - no I/O.

mod admin;
mod book;
mod loan;
pub mod result;
mod session;
mod student;

pub use admin::{Admin, AdminProfile, Role};
pub use book::{Book, LendingState};
pub use loan::Loan;
pub use session::{AuthState, Session};
pub use student::Student;
