//! Student registry port
//!
//! Defines the interface for verifying admission numbers against the
//! school's student directory (an out-of-process service).

use serde::{Deserialize, Serialize};

use crate::domain::result::Result;

/// Enrollment status as reported by the registry.
///
/// Shown to the librarian only. Missing or unrecognised values read as
/// `Unknown` so they never fail a lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Inactive,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A student record as the registry returns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStudent {
    pub admission_number: String,
    pub name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub status: EnrollmentStatus,
}

/// Outcome of a lookup that reached the registry.
///
/// An unknown admission number is an ordinary answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLookup {
    Found(RegistryStudent),
    NotFound,
}

/// Student registry trait
///
/// Implementations block until the registry answers. Transport and
/// protocol failures surface as `Error::RegistryUnavailable`.
pub trait StudentRegistry: Send + Sync {
    /// Registry name for logs (e.g., "school-db")
    fn name(&self) -> &str;

    /// Look up one admission number
    fn verify_student(&self, admission_number: &str) -> Result<RegistryLookup>;
}
