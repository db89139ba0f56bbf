//! Storage layer for sessionlens
//!
//! SQLite-backed result sink with:
//! - Schema migrations via PRAGMA user_version
//! - Repository pattern for the four collections (sessions,
//!   extraction_results, insights, user_comments)
//! - Compare-and-set session status updates

pub mod repo;
pub mod schema;

pub use repo::Database;
