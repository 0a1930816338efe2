//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the library store
//! - HTTP client for the school's StudentRegistry

pub mod duckdb;
pub mod school_registry;

#[cfg(test)]
pub mod registry_mock;
