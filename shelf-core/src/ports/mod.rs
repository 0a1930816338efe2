//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The lending core
//! depends only on these traits, not on concrete registry clients.

mod registry;

pub use registry::{EnrollmentStatus, RegistryLookup, RegistryStudent, StudentRegistry};
